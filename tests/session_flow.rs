use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use label_lens::pipeline::DetectionRequest;
use label_lens::{
    AppError, Configuration, DetectionParameters, ErrorKind, ImageAsset, SessionBuilder,
    SessionHandle, SessionManager, SessionState, SubmitOutcome, Transport,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;

type Reply = Result<Value, AppError>;

/// Each call waits for the test to release it through the matching gate.
#[derive(Default)]
struct GatedTransport {
    calls: AtomicUsize,
    gates: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    seen: Mutex<Vec<DetectionRequest>>,
}

impl GatedTransport {
    fn gate(&self) -> oneshot::Sender<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(reply_rx);
        reply_tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: &DetectionRequest) -> Result<Value, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let gate = self.gates.lock().unwrap().pop_front();
        match gate {
            Some(reply_rx) => reply_rx.await.unwrap_or_else(|_| {
                Err(AppError::Transport {
                    status: None,
                    message: "gate dropped".to_string(),
                })
            }),
            None => Ok(json!([])),
        }
    }
}

fn session(transport: Arc<GatedTransport>) -> (SessionManager, SessionHandle) {
    SessionBuilder::new(Configuration::default())
        .transport(transport)
        .build()
        .unwrap()
}

fn asset(bytes: &[u8]) -> ImageAsset {
    ImageAsset::from_bytes(bytes.to_vec(), Some("image/jpeg"))
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn stale_result_never_overwrites_newer_submission() {
    let transport = Arc::new(GatedTransport::default());
    let first_gate = transport.gate();
    let second_gate = transport.gate();
    let (_manager, handle) = session(transport.clone());

    handle.select_asset(asset(b"first")).await.unwrap();
    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::Started(1)
    );
    wait_until(|| transport.calls() == 1).await;

    handle.clear().await.unwrap();
    assert_eq!(handle.state(), SessionState::Idle);
    handle.select_asset(asset(b"second")).await.unwrap();
    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::Started(2)
    );
    wait_until(|| transport.calls() == 2).await;

    second_gate
        .send(Ok(json!([{"Label": "Dog", "Confidence": 97.0}])))
        .unwrap();
    let state = handle.wait_until_settled().await.unwrap();
    assert_eq!(state.detection().unwrap().result.labels()[0].label, "Dog");

    first_gate
        .send(Ok(json!([{"Label": "Person", "Confidence": 99.0}])))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.stats().await.unwrap().stale_results_discarded == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stale result never arrived");

    let state = handle.state();
    let detection = state.detection().unwrap();
    assert_eq!(detection.result.labels()[0].label, "Dog");
    assert!(!detection.person.present);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.submissions_started, 2);
    assert_eq!(stats.outcomes_published, 1);
}

#[tokio::test]
async fn overlapping_submit_is_a_no_op() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate();
    let (_manager, handle) = session(transport.clone());

    handle.select_asset(asset(b"image")).await.unwrap();
    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::Started(1)
    );
    assert_eq!(
        handle.submit(DetectionParameters::new(50u32, 10u32)).await.unwrap(),
        SubmitOutcome::AlreadyLoading
    );
    assert!(handle.state().is_loading());

    gate.send(Ok(json!([]))).unwrap();
    let state = handle.wait_until_settled().await.unwrap();
    assert!(state.detection().unwrap().result.is_empty());
    assert_eq!(transport.calls(), 1);

    let seen = transport.seen.lock().unwrap();
    assert_eq!((seen[0].max_labels(), seen[0].confidence()), (5, 90));
}

#[tokio::test]
async fn failed_submission_can_be_retried() {
    let transport = Arc::new(GatedTransport::default());
    let failing = transport.gate();
    let succeeding = transport.gate();
    let (_manager, handle) = session(transport.clone());

    handle.select_asset(asset(b"image")).await.unwrap();
    handle.submit(DetectionParameters::default()).await.unwrap();
    failing
        .send(Err(AppError::Transport {
            status: Some(502),
            message: "Bad Gateway".to_string(),
        }))
        .unwrap();
    let state = handle.wait_until_settled().await.unwrap();
    let error = state.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Transport);
    assert_eq!(error.status, Some(502));

    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::Started(2)
    );
    succeeding
        .send(Ok(json!({"labels": [{"Label": "Person", "Confidence": 99.23}],
                        "personPresent": true, "personConfidence": 99.23, "personCount": 1})))
        .unwrap();
    let state = handle.wait_until_settled().await.unwrap();
    assert_eq!(state.detection().unwrap().person.count, Some(1));
}

#[tokio::test]
async fn unrecognized_response_surfaces_as_failed_state() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate();
    let (_manager, handle) = session(transport.clone());

    handle.select_asset(asset(b"image")).await.unwrap();
    handle.submit(DetectionParameters::default()).await.unwrap();
    gate.send(Ok(json!({"body": "{not json"}))).unwrap();

    let state = handle.wait_until_settled().await.unwrap();
    assert_eq!(
        state.error().unwrap().kind,
        ErrorKind::UnrecognizedResponseShape
    );
}

#[tokio::test]
async fn submit_without_selection_and_clear_when_idle() {
    let transport = Arc::new(GatedTransport::default());
    let (_manager, handle) = session(transport.clone());

    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::NoAssetSelected
    );
    handle.clear().await.unwrap();
    assert_eq!(handle.state(), SessionState::Idle);
    assert_eq!(handle.selected().await.unwrap(), None);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn clear_when_idle_keeps_the_selection() {
    let transport = Arc::new(GatedTransport::default());
    let (_manager, handle) = session(transport.clone());
    let selected = asset(b"image");
    handle.select_asset(selected.clone()).await.unwrap();

    let mut state_rx = handle.subscribe();
    state_rx.borrow_and_update();
    handle.clear().await.unwrap();
    assert!(!state_rx.has_changed().unwrap());
    assert_eq!(
        handle.selected().await.unwrap().map(|asset| asset.id()),
        Some(selected.id())
    );

    assert_eq!(
        handle.submit(DetectionParameters::default()).await.unwrap(),
        SubmitOutcome::Started(1)
    );
    handle.wait_until_settled().await.unwrap();
}

#[tokio::test]
async fn selecting_after_success_returns_to_idle() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate();
    let (_manager, handle) = session(transport.clone());

    handle.select_asset(asset(b"first")).await.unwrap();
    handle.submit(DetectionParameters::default()).await.unwrap();
    gate.send(Ok(json!([{"Label": "Cat", "Confidence": 88.0}])))
        .unwrap();
    assert!(handle.wait_until_settled().await.unwrap().detection().is_some());

    handle.select_asset(asset(b"second")).await.unwrap();
    assert_eq!(handle.state(), SessionState::Idle);
}

#[tokio::test]
async fn dropping_the_manager_closes_the_session() {
    let (manager, handle) = session(Arc::new(GatedTransport::default()));
    drop(manager);
    wait_until(|| handle.subscribe().has_changed().is_err()).await;
    assert!(matches!(
        handle.select_asset(asset(b"image")).await,
        Err(AppError::SessionClosed)
    ));
}

#[test]
fn building_without_endpoint_fails() {
    let result = SessionBuilder::new(Configuration::default()).build();
    assert!(matches!(result, Err(AppError::Config(_))));
}
