use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub label: String,
    /// PNG snapshot encoded as a `data:image/png;base64,` URL.
    pub image_data: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// The record persisted between screens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub model_source: String,
    pub score: f64,
    pub time_bonus: f64,
    pub captures: Vec<Capture>,
    pub labels: Vec<String>,
    pub used_labels: Vec<String>,
}

/// Partial record for shallow merges. Absent fields keep their persisted value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_bonus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captures: Option<Vec<Capture>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_labels: Option<Vec<String>>,
}

impl From<GameState> for GameStatePatch {
    fn from(state: GameState) -> Self {
        Self {
            model_source: Some(state.model_source),
            score: Some(state.score),
            time_bonus: Some(state.time_bonus),
            captures: Some(state.captures),
            labels: Some(state.labels),
            used_labels: Some(state.used_labels),
        }
    }
}

impl GameState {
    /// Unparseable input yields the default record.
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn with_model_source(model_source: &str) -> Self {
        Self {
            model_source: model_source.to_string(),
            ..Self::default()
        }
    }

    pub fn merged(mut self, patch: GameStatePatch) -> Self {
        if let Some(model_source) = patch.model_source {
            self.model_source = model_source;
        }
        if let Some(score) = patch.score {
            self.score = score;
        }
        if let Some(time_bonus) = patch.time_bonus {
            self.time_bonus = time_bonus;
        }
        if let Some(captures) = patch.captures {
            self.captures = captures;
        }
        if let Some(labels) = patch.labels {
            self.labels = labels;
        }
        if let Some(used_labels) = patch.used_labels {
            self.used_labels = used_labels;
        }
        self
    }

    /// Keeps the model source, drops everything scoped to a session.
    pub fn reset_session(&self) -> Self {
        Self::with_model_source(&self.model_source)
    }

    pub fn is_label_used(&self, label: &str) -> bool {
        self.used_labels.iter().any(|used| used == label)
    }

    pub fn is_label_available(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label) && !self.is_label_used(label)
    }

    /// Records a capture and scores it. Returns false, leaving the record
    /// untouched, for labels that are unknown or already captured.
    pub fn add_capture(&mut self, label: &str, image_data: String, timestamp: i64) -> bool {
        if !self.is_label_available(label) {
            return false;
        }

        self.captures.push(Capture {
            label: label.to_string(),
            image_data,
            timestamp,
        });
        self.used_labels.push(label.to_string());
        self.score += 1.0;
        true
    }

    pub fn all_labels_used(&self) -> bool {
        !self.labels.is_empty() && self.labels.iter().all(|label| self.is_label_used(label))
    }

    pub fn capture_patch(&self) -> GameStatePatch {
        GameStatePatch {
            score: Some(self.score),
            captures: Some(self.captures.clone()),
            used_labels: Some(self.used_labels.clone()),
            ..GameStatePatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_labels(labels: &[&str]) -> GameState {
        GameState {
            model_source: "https://teachablemachine.withgoogle.com/models/abc/".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            ..GameState::default()
        }
    }

    #[test]
    fn test_unparseable_json_is_default() {
        assert_eq!(GameState::from_json("not json"), GameState::default());
        assert_eq!(GameState::from_json(""), GameState::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let state = GameState::from_json(r#"{"modelSource":"https://x/"}"#);

        assert_eq!(state.model_source, "https://x/");
        assert_eq!(state.score, 0.0);
        assert!(state.captures.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let mut state = state_with_labels(&["Wave"]);
        state.add_capture("Wave", "data:image/png;base64,AAAA".to_string(), 42);

        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();

        assert!(json.get("modelSource").is_some());
        assert!(json.get("timeBonus").is_some());
        assert!(json.get("usedLabels").is_some());
        assert_eq!(json["captures"][0]["imageData"], "data:image/png;base64,AAAA");
        assert_eq!(json["captures"][0]["timestamp"], 42);
    }

    #[test]
    fn test_merge_only_touches_present_fields() {
        let state = state_with_labels(&["Wave", "Squat"]);

        let merged = state.clone().merged(GameStatePatch {
            score: Some(2.0),
            ..GameStatePatch::default()
        });

        assert_eq!(merged.score, 2.0);
        assert_eq!(merged.labels, state.labels);
        assert_eq!(merged.model_source, state.model_source);
    }

    #[test]
    fn test_add_capture_rejects_duplicates() {
        let mut state = state_with_labels(&["Wave", "Squat"]);

        assert!(state.add_capture("Wave", "a".to_string(), 1));
        assert!(!state.add_capture("Wave", "b".to_string(), 2));

        assert_eq!(state.captures.len(), 1);
        assert_eq!(state.used_labels, vec!["Wave".to_string()]);
        assert_eq!(state.score, 1.0);
    }

    #[test]
    fn test_add_capture_rejects_unknown_label() {
        let mut state = state_with_labels(&["Wave"]);

        assert!(!state.add_capture("Jump", "a".to_string(), 1));
        assert!(state.used_labels.is_empty());
        assert_eq!(state.captures.len(), state.used_labels.len());
    }

    #[test]
    fn test_all_labels_used() {
        let mut state = state_with_labels(&["Wave", "Squat"]);
        assert!(!state.all_labels_used());

        state.add_capture("Squat", "a".to_string(), 1);
        assert!(!state.all_labels_used());

        state.add_capture("Wave", "b".to_string(), 2);
        assert!(state.all_labels_used());

        assert!(!GameState::default().all_labels_used());
    }

    #[test]
    fn test_reset_session_keeps_model_source() {
        let mut state = state_with_labels(&["Wave"]);
        state.add_capture("Wave", "a".to_string(), 1);
        state.time_bonus = 0.4;
        state.score = 1.4;

        let reset = state.reset_session();

        assert_eq!(reset.model_source, state.model_source);
        assert_eq!(reset.score, 0.0);
        assert_eq!(reset.time_bonus, 0.0);
        assert!(reset.captures.is_empty());
        assert!(reset.labels.is_empty());
        assert!(reset.used_labels.is_empty());
    }
}
