//! End-to-end runs of the assembled engine against a scripted browser.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use action_flow::Workflow;
use batch_runner::{BatchError, FormPlan};
use checkpoint_store::{
    Checkpoint, CheckpointStore, FileCheckpointStore, HandoffState, Progress, ResultStatus, Stage,
};
use formrunner_cli::engine::{assemble, open_store, Engine};
use formrunner_cli::AppConfig;
use formrunner_core_types::testing::{PageEffect, ScriptedSession};
use formrunner_core_types::SessionError;
use human_handoff::{AutoResume, ChannelResume, ResumeSignal};
use serde_json::{json, Value};
use tempfile::TempDir;

const NEW_INVOICE: &str = "https://erp.test/odoo/accounting/customer-invoices/new";

const PLAN: &str = r##"
name: customer_invoice
fields:
  - name: customer
    sub_steps:
      - name: focus
        actions:
          - kind: click
            target: { selector: "#customer" }
      - name: type
        actions:
          - kind: type
            selector: "#customer"
            text: "{{value}}"
      - name: confirm
        actions:
          - kind: click
            target: { text: "{{value}}" }
  - name: reference
    sub_steps:
      - name: type
        actions:
          - kind: type
            selector: "#reference"
            text: "{{value}}"
      - name: confirm
        actions:
          - kind: click
            target: { text: "{{value}}" }
"##;

const NAVIGATION: &str = r##"
name: open_new_invoice
steps:
  - name: navigate_to_new_invoice
    actions:
      - kind: navigate
        url: https://erp.test/odoo/accounting/customer-invoices/new
  - name: open_customers_dropdown
    validators:
      element_visible: ".o_customer_dropdown"
    actions:
      - kind: click
        target: { selector: ".o_customer_dropdown" }
    transitions:
      on_validation_fail: { action: recover }
  - name: verify_invoice_form_loaded
    validators:
      url_contains: customer-invoices/new
recovery:
  - when: { condition: url_contains, value: customer-invoices/new }
    target_step: verify_invoice_form_loaded
  - when: { condition: default }
    target_step: navigate_to_new_invoice
"##;

const HEADER_STEP: &str = r##"
name: invoice_header
steps:
  - name: fill_header
    actions:
      - kind: click
        target: { selector: "#first" }
      - kind: click
        target: { selector: "#second" }
"##;

struct Harness {
    dir: TempDir,
    config: AppConfig,
    session: Arc<ScriptedSession>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.checkpoint.path = dir.path().join("handoff_state.json");
        config.handoff.screenshot_dir = dir.path().join("screenshots");
        config.browser.poll_interval_ms = 10;
        config.browser.default_timeout_ms = 200;
        Self {
            dir,
            config,
            session: Arc::new(ScriptedSession::at("https://erp.test/odoo")),
        }
    }

    fn engine(&self, workflow: Option<&str>, signal: Arc<dyn ResumeSignal>) -> Engine {
        assemble(
            &self.config,
            self.session.clone(),
            signal,
            FormPlan::from_yaml_str(PLAN).unwrap(),
            workflow.map(|raw| Workflow::from_yaml_str(raw).unwrap()),
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn store(&self) -> Arc<dyn CheckpointStore> {
        open_store(&self.config)
    }
}

fn invoices() -> Vec<Value> {
    vec![
        json!({"customer": "Acme", "reference": "PO-1"}),
        json!({"customer": "Globex", "reference": "PO-2"}),
        json!({"customer": "Initech", "reference": "PO-3"}),
    ]
}

#[tokio::test]
async fn failing_field_is_itemized_and_batch_continues() {
    let harness = Harness::new();
    harness.session.fail_times(
        "click:text=PO-REJECT",
        10,
        SessionError::NotFound("option PO-REJECT".into()),
    );
    let mut items = invoices();
    items[1]["reference"] = json!("PO-REJECT");

    let engine = harness.engine(None, Arc::new(AutoResume));
    let batch = engine.orchestrator.process(&items).await;

    assert_eq!(batch.total, 3);
    assert_eq!(batch.successful, 2);
    assert_eq!(batch.failed, 1);
    assert_eq!(batch.outcomes.len(), 3);

    let failed = batch.outcome(1).unwrap();
    assert_eq!(failed.status, ResultStatus::Partial);
    assert!(failed.result.fields_filled.contains_key("customer"));
    let reason = &failed.result.fields_failed["reference"];
    assert!(reason.contains("PO-REJECT"), "reason was {}", reason);

    assert!(batch.outcome(2).unwrap().is_success());
    assert_eq!(harness.session.count("type:#reference=PO-3"), 1);

    let saved = harness.store().load().await.expect("record kept");
    assert_eq!(saved.resume_index(), 1);

    harness.session.fail_times(
        "click:text=PO-REJECT",
        0,
        SessionError::NotFound("option PO-REJECT".into()),
    );
    let resumed = engine.orchestrator.resume(&items).await.unwrap();
    assert_eq!(resumed.skipped, vec![0]);
    assert_eq!(resumed.failed, 0);
    assert!(resumed.outcome(1).unwrap().is_success());
    assert_eq!(harness.session.count("click:text=PO-REJECT"), 1);
    assert!(!harness.store().exists().await);
}

#[tokio::test]
async fn unexpected_location_routes_to_later_step() {
    let harness = Harness::new();
    let engine = harness.engine(Some(NAVIGATION), Arc::new(AutoResume));

    let batch = engine.orchestrator.process(&invoices()[..1]).await;

    let outcome = batch.outcome(0).unwrap();
    assert!(outcome.is_success(), "status was {}", outcome.status);
    assert!(outcome
        .result
        .steps_taken
        .iter()
        .any(|entry| entry == "Recovery: open_customers_dropdown -> verify_invoice_form_loaded"));
    assert_eq!(harness.session.count("click:.o_customer_dropdown"), 0);
    assert_eq!(harness.session.count(&format!("navigate:{}", NEW_INVOICE)), 1);
    assert_eq!(harness.session.value_of("#customer").as_deref(), Some("Acme"));
}

#[tokio::test]
async fn blocker_mid_step_pauses_and_resumes_in_place() {
    let harness = Harness::new();
    harness.session.on(
        "click:#first",
        vec![PageEffect::OpenDialog {
            selector: ".modal".into(),
            text: "Security check: please verify you are human".into(),
        }],
    );
    let (signal, handle) = ChannelResume::new();
    let engine = harness.engine(Some(HEADER_STEP), Arc::new(signal));
    let mut notices = engine.handoff.subscribe();

    let orchestrator = engine.orchestrator;
    let items = invoices()[..1].to_vec();
    let run = tokio::spawn(async move { orchestrator.process(&items).await });

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("no pause notice")
        .unwrap();
    assert_eq!(notice.step.as_deref(), Some("fill_header"));
    assert_eq!(notice.sub_step.as_deref(), Some("action_1"));

    let saved = harness.store().load().await.expect("handoff state saved");
    assert_eq!(saved.checkpoint.stage, Stage::Navigate);
    assert_eq!(saved.checkpoint.item_index, Some(0));
    assert_eq!(saved.checkpoint.last_completed_sub_step.as_deref(), Some("action_0"));
    assert_eq!(saved.result.status, ResultStatus::AwaitingHuman);
    let screenshot = saved.screenshot_path.expect("screenshot recorded");
    assert!(screenshot.exists());
    assert_eq!(harness.session.count("click:#second"), 0);

    harness.session.close_dialogs();
    assert!(handle.resume().await);
    let batch = run.await.unwrap();

    assert_eq!(batch.successful, 1);
    assert_eq!(harness.session.count("click:#first"), 1);
    assert_eq!(harness.session.count("click:#second"), 1);
    assert!(!harness.store().exists().await);
}

#[tokio::test]
async fn clean_batch_deletes_record_and_resume_finds_nothing() {
    let harness = Harness::new();
    let engine = harness.engine(None, Arc::new(AutoResume));
    let items = invoices();

    let batch = engine.orchestrator.process(&items).await;
    assert_eq!(batch.successful, 3);
    assert_eq!(batch.failed, 0);
    assert!(!harness.config.checkpoint.path.exists());

    let err = engine.orchestrator.resume(&items).await.unwrap_err();
    assert!(matches!(err, BatchError::NothingToResume));
    assert_eq!(err.to_string(), "No handoff state found; nothing to resume");
}

#[tokio::test]
async fn resume_repeats_only_work_after_the_saved_sub_step() {
    let harness = Harness::new();
    let items = invoices();

    let mut checkpoint = Checkpoint::for_item(1);
    checkpoint.enter_stage(Stage::FillForm);
    checkpoint.set_field("customer");
    checkpoint.begin_sub_step("focus");
    checkpoint.complete_sub_step("focus");
    checkpoint.begin_sub_step("type");
    checkpoint.complete_sub_step("type");
    let progress = Progress::new(checkpoint, items[1].clone());
    FileCheckpointStore::new(harness.config.checkpoint.path.clone())
        .try_save(&HandoffState::capture(&progress, "process restarted"))
        .await
        .unwrap();

    let engine = harness.engine(Some(NAVIGATION), Arc::new(AutoResume));
    let batch = engine.orchestrator.resume(&items).await.unwrap();

    assert_eq!(batch.skipped, vec![0]);
    assert_eq!(batch.outcomes.len(), 2);
    assert_eq!(batch.successful, 2);
    assert!(batch
        .outcome(1)
        .unwrap()
        .result
        .steps_taken
        .iter()
        .any(|entry| entry == "Resumed after: process restarted"));

    let log = harness.session.log();
    let navigate = log
        .iter()
        .position(|entry| entry.starts_with("navigate:"))
        .expect("fresh item navigates");
    assert_eq!(
        log[..navigate].to_vec(),
        vec![
            "click:text=Globex".to_string(),
            "clear:#reference".to_string(),
            "type:#reference=PO-2".to_string(),
            "click:text=PO-2".to_string(),
        ]
    );
    assert_eq!(harness.session.count("navigate:"), 1);
    assert_eq!(harness.session.count("type:#customer=Acme"), 0);
    assert_eq!(harness.session.count("type:#customer=Initech"), 1);
    assert!(!harness.dir.path().join("handoff_state.json").exists());
}

#[test]
fn bundled_demo_definitions_are_valid() {
    let workflow =
        Workflow::from_yaml_str(include_str!("../demos/new_invoice.workflow.yaml")).unwrap();
    assert_eq!(workflow.steps.len(), 2);

    let plan = FormPlan::from_yaml_str(include_str!("../demos/customer_invoice.plan.yaml")).unwrap();
    assert_eq!(plan.fields[1].source_key(), "po_number");

    let items = formrunner_cli::items::parse_json(include_str!("../demos/invoices.json")).unwrap();
    assert_eq!(items[0]["lines"].as_array().map(Vec::len), Some(2));

    let config: AppConfig = serde_yaml::from_str(include_str!("../demos/formrunner.yaml")).unwrap();
    assert_eq!(config.batch.next_unit_target.as_deref(), Some("text=New"));
}
