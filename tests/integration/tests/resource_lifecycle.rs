use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use customcrud_exec::CancellationToken;
use customcrud_provider::{
    ApplyOutcome, CrudHooks, CrudOp, Provider, ProviderSettings, ReadOutcome, ResourcePlan,
};
use customcrud_value::DynamicValue;
use serde_json::json;
use tempfile::{tempdir, TempDir};

struct HookWorkspace {
    dir: TempDir,
}

impl HookWorkspace {
    fn new() -> Self {
        Self {
            dir: tempdir().expect("tempdir"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn script(&self, name: &str, body: &str) -> String {
        let path = self.path().join(name);
        fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).expect("write script");
        format!("sh {}", path.display())
    }

    fn calls_log(&self) -> PathBuf {
        self.path().join("calls.log")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.calls_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// File-backed hooks: the object's id is a temp file holding its input.
    fn file_hooks(&self) -> CrudHooks {
        let log = self.calls_log();
        let log = log.display();
        let objects = self.path().join("objects");
        fs::create_dir_all(&objects).expect("objects dir");
        let objects = objects.display();
        CrudHooks::default()
            .with_command(
                CrudOp::Create,
                self.script(
                    "create.sh",
                    &format!(
                        "echo create >> {log}\n\
                         file=$(mktemp {objects}/obj.XXXXXX)\n\
                         cat > \"$file\"\n\
                         printf '{{\"id\":\"%s\"}}' \"$file\""
                    ),
                ),
            )
            .with_command(
                CrudOp::Read,
                self.script(
                    "read.sh",
                    &format!(
                        "echo read >> {log}\n\
                         payload=$(cat)\n\
                         id=$(printf '%s' \"$payload\" | sed -n 's/.*\"id\":\"\\([^\"]*\\)\".*/\\1/p')\n\
                         [ -f \"$id\" ] || exit 22\n\
                         printf '{{\"stored\":true}}'"
                    ),
                ),
            )
            .with_command(
                CrudOp::Update,
                self.script("update.sh", &format!("echo update >> {log}\ncat >/dev/null\necho '{{}}'")),
            )
            .with_command(
                CrudOp::Delete,
                self.script(
                    "delete.sh",
                    &format!(
                        "echo delete >> {log}\n\
                         payload=$(cat)\n\
                         id=$(printf '%s' \"$payload\" | sed -n 's/.*\"id\":\"\\([^\"]*\\)\".*/\\1/p')\n\
                         rm -f \"$id\""
                    ),
                ),
            )
    }
}

fn plan(hooks: CrudHooks, input: DynamicValue) -> ResourcePlan {
    ResourcePlan {
        hooks,
        input,
        write_only_input: None,
    }
}

#[tokio::test]
async fn integration_create_read_delete_round_trip_against_temp_files() {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings::default()).expect("provider");
    let cancel = CancellationToken::new();
    let resources = provider.resource();

    let created = resources
        .create(
            &plan(
                workspace.file_hooks(),
                DynamicValue::object([("size", DynamicValue::from(3_i64))]),
            ),
            &cancel,
        )
        .await
        .expect("create");
    let object_file = PathBuf::from(&created.id);
    assert!(object_file.exists());
    let stored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&object_file).expect("object")).expect("json");
    assert_eq!(stored["input"], json!({"size": 3}));

    let ReadOutcome::Present(refreshed) = resources.read(&created, &cancel).await.expect("read")
    else {
        panic!("object should still exist");
    };
    assert_eq!(refreshed.id, created.id);

    resources.delete(&created, &cancel).await.expect("delete");
    assert!(!object_file.exists());
    assert_eq!(
        resources.read(&created, &cancel).await.expect("read after delete"),
        ReadOutcome::Removed
    );
    assert_eq!(workspace.calls(), ["create", "read", "delete", "read"]);
}

#[tokio::test]
async fn regression_apply_with_unchanged_input_never_runs_update() {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings::default()).expect("provider");
    let cancel = CancellationToken::new();
    let input = DynamicValue::object([("name", DynamicValue::from("web"))]);

    let first = provider
        .resource()
        .apply(None, &plan(workspace.file_hooks(), input.clone()), &cancel)
        .await
        .expect("create");
    let second = provider
        .resource()
        .apply(
            Some(first.state()),
            &plan(workspace.file_hooks(), input),
            &cancel,
        )
        .await
        .expect("apply");

    assert!(matches!(second, ApplyOutcome::Unchanged(_)));
    assert_eq!(workspace.calls(), ["create"]);
}

#[tokio::test]
async fn integration_changed_input_without_update_hook_replaces_object() {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings::default()).expect("provider");
    let cancel = CancellationToken::new();
    let mut hooks = workspace.file_hooks();
    hooks.update = None;

    let first = provider
        .resource()
        .apply(
            None,
            &plan(hooks.clone(), DynamicValue::object([("v", DynamicValue::from(1_i64))])),
            &cancel,
        )
        .await
        .expect("create")
        .into_state();
    let second = provider
        .resource()
        .apply(
            Some(&first),
            &plan(hooks, DynamicValue::object([("v", DynamicValue::from(2_i64))])),
            &cancel,
        )
        .await
        .expect("replace");

    assert_eq!(second.action(), "replaced");
    assert_ne!(second.state().id, first.id);
    assert!(!Path::new(&first.id).exists());
    assert_eq!(workspace.calls(), ["create", "delete", "create"]);
}

async fn run_three_slow_reads(parallelism: u32) -> Duration {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings {
        parallelism: Some(parallelism),
        ..ProviderSettings::default()
    })
    .expect("provider");
    let hooks = CrudHooks::default().with_command(
        CrudOp::Read,
        workspace.script("slow.sh", "cat >/dev/null\nsleep 0.4\necho '{}'"),
    );
    let config = customcrud_provider::DataSourceConfig {
        hooks,
        input: DynamicValue::Null,
    };
    let cancel = CancellationToken::new();
    let data_sources = provider.data_source();

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        data_sources.read(&config, &cancel),
        data_sources.read(&config, &cancel),
        data_sources.read(&config, &cancel),
    );
    a.expect("first");
    b.expect("second");
    c.expect("third");
    started.elapsed()
}

#[tokio::test]
async fn integration_parallelism_limit_serializes_hooks() {
    let serialized = run_three_slow_reads(1).await;
    assert!(
        serialized >= Duration::from_millis(1_150),
        "parallelism=1 should run hooks one at a time, took {serialized:?}"
    );

    let concurrent = run_three_slow_reads(0).await;
    assert!(
        concurrent < serialized,
        "unlimited parallelism should overlap hooks ({concurrent:?} vs {serialized:?})"
    );
}

#[tokio::test]
async fn regression_failure_message_masks_sensitive_defaults() {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings {
        sensitive_default_inputs: Some(json!({"api_key": "sk-live-123"})),
        ..ProviderSettings::default()
    })
    .expect("provider");
    let hooks = workspace
        .file_hooks()
        .with_command(
            CrudOp::Create,
            workspace.script(
                "leaky.sh",
                "cat\necho 'auth sk-live-123 rejected' >&2\nexit 4",
            ),
        );

    let error = provider
        .resource()
        .create(&plan(hooks, DynamicValue::Null), &CancellationToken::new())
        .await
        .expect_err("create should fail");
    let rendered = error.to_string();
    assert!(rendered.starts_with("Create Script Failed"), "{rendered}");
    assert!(rendered.contains("Exit Code: 4"), "{rendered}");
    assert!(!rendered.contains("sk-live-123"), "{rendered}");
    assert_eq!(error.exit_code(), Some(4));
}

#[tokio::test]
async fn integration_timeout_cancels_long_running_hook() {
    let workspace = HookWorkspace::new();
    let provider = Provider::from_settings(&ProviderSettings::default()).expect("provider");
    let hooks = workspace
        .file_hooks()
        .with_command(CrudOp::Create, workspace.script("hang.sh", "sleep 30"));
    let cancel = CancellationToken::new().with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let error = provider
        .resource()
        .create(&plan(hooks, DynamicValue::Null), &cancel)
        .await
        .expect_err("timeout");
    assert!(error.is_cancelled(), "{error}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
