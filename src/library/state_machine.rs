use std::marker::PhantomData;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Elm-style runtime. Events are folded through `transition_fn` one at a time on
/// a single loop thread, every new state is handed to `render_fn`, and the
/// effects it returns are handed to `run_effect_fn` on the loop thread in the
/// order they were emitted, with a sender for reporting back. `run_effect_fn`
/// must not block; slow work belongs on a thread it spawns. The loop returns
/// once `is_done_fn` accepts a state.
#[derive(Debug, Clone)]
pub struct StateMachine<TState, TEvent, TEffect, T, R, E, D>
where
    T: Fn(TState, TEvent) -> (TState, Vec<TEffect>) + Send + Sync,
    R: Fn(&TState) + Send + Sync,
    E: Fn(TEffect, Sender<TEvent>) + Send + Sync,
    D: Fn(&TState) -> bool + Send + Sync,
{
    pub init: (TState, Vec<TEffect>),
    pub transition_fn: Arc<T>,
    pub render_fn: Arc<R>,
    pub run_effect_fn: Arc<E>,
    pub is_done_fn: Arc<D>,
    _event: PhantomData<TEvent>,
}

pub type RunResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

impl<TState, TEvent, TEffect, T, R, E, D> StateMachine<TState, TEvent, TEffect, T, R, E, D>
where
    TState: Clone + Send + 'static,
    TEvent: Send + 'static,
    TEffect: Clone + Send + 'static,
    T: Fn(TState, TEvent) -> (TState, Vec<TEffect>) + Send + Sync + 'static,
    R: Fn(&TState) + Send + Sync + 'static,
    E: Fn(TEffect, Sender<TEvent>) + Send + Sync + 'static,
    D: Fn(&TState) -> bool + Send + Sync + 'static,
{
    pub fn new(
        init: (TState, Vec<TEffect>),
        transition_fn: T,
        render_fn: R,
        run_effect_fn: E,
        is_done_fn: D,
    ) -> Self {
        Self {
            init,
            transition_fn: Arc::new(transition_fn),
            render_fn: Arc::new(render_fn),
            run_effect_fn: Arc::new(run_effect_fn),
            is_done_fn: Arc::new(is_done_fn),
            _event: PhantomData,
        }
    }

    /// Starts the loop on its own thread. The returned sender is how callers
    /// outside the machine (the UI) feed events in.
    pub fn spawn(self) -> (Sender<TEvent>, JoinHandle<RunResult>) {
        let (event_sender, event_receiver) = channel();
        let loop_sender = event_sender.clone();
        let handle = std::thread::spawn(move || self.run(loop_sender, event_receiver));
        (event_sender, handle)
    }

    pub fn run(&self, event_sender: Sender<TEvent>, event_receiver: Receiver<TEvent>) -> RunResult {
        let (mut state, effects) = self.init.clone();

        (self.render_fn)(&state);
        self.dispatch_effects(effects, &event_sender);

        loop {
            let event = event_receiver.recv()?;

            let (new_state, new_effects) = (self.transition_fn)(state, event);
            state = new_state;

            (self.render_fn)(&state);
            self.dispatch_effects(new_effects, &event_sender);

            if (self.is_done_fn)(&state) {
                return Ok(());
            }
        }
    }

    fn dispatch_effects(&self, effects: Vec<TEffect>, event_sender: &Sender<TEvent>) {
        for effect in effects {
            (self.run_effect_fn)(effect, event_sender.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Effect {
        Increment,
    }

    #[test]
    fn test_runs_effects_until_done() {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let rendered_clone = rendered.clone();

        let machine = StateMachine::new(
            (0u32, vec![Effect::Increment]),
            |count: u32, step: u32| {
                let next = count + step;
                let effects = if next < 3 { vec![Effect::Increment] } else { vec![] };
                (next, effects)
            },
            move |count: &u32| rendered_clone.lock().unwrap().push(*count),
            |effect: Effect, sender: Sender<u32>| match effect {
                Effect::Increment => {
                    let _ = sender.send(1);
                }
            },
            |count: &u32| *count >= 3,
        );

        let (_sender, handle) = machine.spawn();

        assert!(handle.join().unwrap().is_ok());
        assert_eq!(*rendered.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_effects_are_dispatched_in_emission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let machine = StateMachine::new(
            (0u32, Vec::<u32>::new()),
            |_: u32, event: u32| (event, (0..event).collect()),
            |_: &u32| {},
            move |effect: u32, _: Sender<u32>| seen_clone.lock().unwrap().push(effect),
            |state: &u32| *state >= 5,
        );

        let (sender, handle) = machine.spawn();
        sender.send(3).unwrap();
        sender.send(5).unwrap();

        assert!(handle.join().unwrap().is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_external_events_are_processed() {
        let machine = StateMachine::new(
            (String::new(), Vec::<Effect>::new()),
            |mut text: String, c: char| {
                text.push(c);
                (text, vec![])
            },
            |_: &String| {},
            |_: Effect, _: Sender<char>| {},
            |text: &String| text == "ok",
        );

        let (sender, handle) = machine.spawn();
        sender.send('o').unwrap();
        sender.send('k').unwrap();

        assert!(handle.join().unwrap().is_ok());
    }
}
