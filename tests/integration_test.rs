use async_trait::async_trait;
use autoflow::executor::backend::AutomationBackend;
use autoflow::executor::{ActionExecutor, ExecutionError};
use autoflow::sequencer::{ChannelObserver, NoDelay, ProgressEvent, RunStatus, Sequencer};
use autoflow::storage::{FileStore, KeyValueStore};
use autoflow::workflow::draft::Draft;
use autoflow::workflow::store::WorkflowStore;
use autoflow::workflow::{
    ClickButtonParams, ExtractDataParams, FillFormParams, NotificationParams, ScheduleParams,
    StepKind,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const KEY: &str = "autoflow-workflows";

/// Backend that remembers what ran and refuses to click `#missing`.
#[derive(Default)]
struct PageBackend {
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl AutomationBackend for PageBackend {
    fn name(&self) -> &str {
        "page"
    }

    async fn fill_form(&self, params: &FillFormParams) -> Result<(), ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("fill {}", params.fields.len()));
        Ok(())
    }

    async fn click_button(&self, params: &ClickButtonParams) -> Result<(), ExecutionError> {
        if params.selector == "#missing" {
            return Err(ExecutionError::Action(format!(
                "no element matches {}",
                params.selector
            )));
        }
        self.log
            .lock()
            .await
            .push(format!("click {}", params.selector));
        Ok(())
    }

    async fn send_notification(&self, params: &NotificationParams) -> Result<(), ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("notify {}", params.message));
        Ok(())
    }

    async fn extract_data(&self, params: &ExtractDataParams) -> Result<(), ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("extract {}", params.selector));
        Ok(())
    }

    async fn schedule_task(&self, params: &ScheduleParams) -> Result<(), ExecutionError> {
        self.log
            .lock()
            .await
            .push(format!("schedule {}", params.time));
        Ok(())
    }
}

#[tokio::test]
async fn test_build_save_reload_and_run() {
    let tmp = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(tmp.path()));

    // Assemble a draft and save it.
    let mut draft = Draft::new();
    draft.push(StepKind::FillForm);
    let click = draft.push(StepKind::ClickButton).id;
    draft.push(StepKind::Notify);
    draft.rename(click, "Press submit");

    let saved = {
        let store = WorkflowStore::open(kv.clone(), KEY).await;
        store
            .add("Signup", Some("Fill, submit, ping".into()), draft.steps().to_vec())
            .await
            .unwrap()
    };

    // Editing the draft after saving must not touch the stored copy.
    draft.clear();

    let store = WorkflowStore::open(kv, KEY).await;
    let workflow = store.get(&saved.id).await.unwrap();
    assert_eq!(workflow.steps.len(), 3);
    assert_eq!(workflow.steps[1].name, "Press submit");

    let backend = Arc::new(PageBackend::default());
    let sequencer = Sequencer::new(Arc::new(ActionExecutor::new(backend.clone())))
        .with_delay(Arc::new(NoDelay));
    let (observer, mut rx) = ChannelObserver::new();

    let report = sequencer
        .run_workflow(&workflow, &observer, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        *backend.log.lock().await,
        vec!["fill 0", "click ", "notify Notification from AutoFlow"]
    );

    drop(observer);
    let mut started = Vec::new();
    let mut finished = 0;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::StepStarted { index, .. } => started.push(index),
            ProgressEvent::Finished(_) => finished += 1,
            ProgressEvent::StepFailed { .. } => panic!("no step should fail"),
            ProgressEvent::ClearMarkers => {}
        }
    }
    assert_eq!(started, vec![0, 1, 2]);
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn test_imported_workflow_fails_fast_without_touching_store() {
    let tmp = tempfile::tempdir().unwrap();
    let store = WorkflowStore::open(Arc::new(FileStore::new(tmp.path())), KEY).await;

    let exported = json!({
        "id": "1712345678901",
        "name": "Broken checkout",
        "description": "",
        "created": "2024-04-05T12:00:00.000Z",
        "steps": [
            {"id": 1, "type": "extract-data", "name": "Read cart", "data": {"selector": ".cart", "storage": "variable"}},
            {"id": 2, "type": "wiggle-mouse", "name": "Future step", "data": {}},
            {"id": 3, "type": "click-button", "name": "Pay", "data": {"selector": "#missing"}},
            {"id": 4, "type": "send-notification", "name": "Tell user", "data": {"message": "paid"}}
        ]
    })
    .to_string();

    let workflow = store.import_from(&exported).await.unwrap();
    let before = store.list().await;

    let backend = Arc::new(PageBackend::default());
    let sequencer = Sequencer::new(Arc::new(ActionExecutor::new(backend.clone())))
        .with_delay(Arc::new(NoDelay));
    let (observer, _rx) = ChannelObserver::new();

    let report = sequencer
        .run(&workflow.steps, &observer, &CancellationToken::new())
        .await
        .unwrap();

    match report.status {
        RunStatus::Failed {
            index,
            ref step_name,
            ..
        } => {
            assert_eq!(index, 2);
            assert_eq!(step_name, "Pay");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.steps_executed, 3);
    assert_eq!(*backend.log.lock().await, vec!["extract .cart"]);
    assert_eq!(store.list().await, before);
}

#[tokio::test]
async fn test_export_is_reimportable_across_stores() {
    let tmp = tempfile::tempdir().unwrap();
    let source = WorkflowStore::open(Arc::new(FileStore::new(tmp.path().join("a"))), KEY).await;
    let target = WorkflowStore::open(Arc::new(FileStore::new(tmp.path().join("b"))), KEY).await;

    let mut draft = Draft::new();
    draft.push(StepKind::ScheduleTask);
    draft.push(StepKind::parse("bogus"));
    let original = source.add("Nightly", None, draft.into_steps()).await.unwrap();

    let text = WorkflowStore::export_to(&original).unwrap();
    let copy = target.import_from(&text).await.unwrap();

    assert_eq!(copy.name, original.name);
    assert_eq!(copy.description, original.description);
    assert_eq!(copy.steps, original.steps);
    assert_eq!(source.len().await, 1);
    assert_eq!(target.len().await, 1);
}
