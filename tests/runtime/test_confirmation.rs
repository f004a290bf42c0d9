use async_trait::async_trait;
use gitfleet::core::confirm::{
    ConfirmationCascade, ConfirmationResult, NonInteractivePrompter, Prompter,
};
use gitfleet::core::AppError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers from a script, slowly enough that concurrent callers queue on the gate.
struct SlowScript {
    answers: Mutex<Vec<ConfirmationResult>>,
    asked: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowScript {
    fn new(mut answers: Vec<ConfirmationResult>) -> Arc<Self> {
        answers.reverse();
        Arc::new(Self {
            answers: Mutex::new(answers),
            asked: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Prompter for SlowScript {
    fn prompter_type(&self) -> &'static str {
        "slow-script"
    }

    async fn confirm(&self, _prompt: &str) -> Result<ConfirmationResult, AppError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_prompts_are_answered_in_sequence() {
    let script = SlowScript::new(vec![
        ConfirmationResult::yes(),
        ConfirmationResult::no(),
        ConfirmationResult::yes(),
    ]);
    let cascade = ConfirmationCascade::new(Some(script.clone()), false);

    assert!(cascade.confirm("first?").await.unwrap().confirmed);
    assert!(!cascade.confirm("second?").await.unwrap().confirmed);
    assert!(cascade.confirm("third?").await.unwrap().confirmed);
    assert_eq!(script.asked.load(Ordering::SeqCst), 3);
    assert!(!cascade.assume_yes());
}

#[tokio::test]
async fn test_concurrent_prompts_never_overlap() {
    let script = SlowScript::new(vec![ConfirmationResult::yes(); 4]);
    let cascade = Arc::new(ConfirmationCascade::new(Some(script.clone()), false));

    let answers = futures::future::join_all((0..4).map(|i| {
        let cascade = cascade.clone();
        async move { cascade.confirm(&format!("repo {}?", i)).await }
    }))
    .await;

    assert!(answers.iter().all(|answer| answer.as_ref().unwrap().confirmed));
    assert_eq!(script.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_apply_to_all_releases_waiting_callers_without_asking() {
    let script = SlowScript::new(vec![ConfirmationResult::all()]);
    let cascade = Arc::new(ConfirmationCascade::new(Some(script.clone()), false));

    let answers = futures::future::join_all((0..5).map(|_| {
        let cascade = cascade.clone();
        async move { cascade.confirm("apply?").await.unwrap() }
    }))
    .await;

    assert_eq!(script.asked.load(Ordering::SeqCst), 1);
    assert!(answers.iter().all(|answer| answer.confirmed));
    assert!(cascade.assume_yes());
}

#[tokio::test]
async fn test_without_terminal_every_prompt_is_declined() {
    let cascade = ConfirmationCascade::new(Some(Arc::new(NonInteractivePrompter)), false);
    let answer = cascade.confirm("apply?").await.unwrap();
    assert_eq!(answer, ConfirmationResult::no());
    assert!(!cascade.assume_yes());
}

#[tokio::test]
async fn test_assume_yes_from_the_start_never_prompts() {
    let script = SlowScript::new(Vec::new());
    let cascade = ConfirmationCascade::new(Some(script.clone()), true);
    let answer = cascade.confirm("apply?").await.unwrap();
    assert!(answer.confirmed);
    assert_eq!(script.asked.load(Ordering::SeqCst), 0);
}
