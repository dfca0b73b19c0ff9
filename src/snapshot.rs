use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

pub fn encode_png_data_url(
    image: &DynamicImage,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(format!(
        "{}{}",
        PNG_DATA_URL_PREFIX,
        STANDARD.encode(bytes.into_inner())
    ))
}

pub fn decode_png_data_url(
    data_url: &str,
) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
    let encoded = data_url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or("not a PNG data URL")?;
    let bytes = STANDARD.decode(encoded)?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
    Ok(image)
}
