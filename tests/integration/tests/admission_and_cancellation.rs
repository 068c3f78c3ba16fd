use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};

use customcrud_exec::CancellationToken;
use customcrud_provider::{
    CrudHooks, CrudOp, DataSourceConfig, Provider, ProviderSettings, ResourcePlan,
};
use customcrud_value::DynamicValue;
use tempfile::tempdir;

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    format!("sh {}", path.display())
}

fn provider(parallelism: u32) -> Provider {
    Provider::from_settings(&ProviderSettings {
        parallelism: Some(parallelism),
        ..ProviderSettings::default()
    })
    .expect("provider")
}

fn read_config(command: String) -> DataSourceConfig {
    DataSourceConfig {
        hooks: CrudHooks::default().with_command(CrudOp::Read, command),
        input: DynamicValue::Null,
    }
}

#[tokio::test]
async fn integration_parallelism_two_admits_exactly_two_hooks() {
    let temp = tempdir().expect("tempdir");
    let running = temp.path().join("running");
    fs::create_dir_all(&running).expect("running dir");
    let peaks = temp.path().join("peaks.log");
    let config = read_config(script(
        temp.path(),
        "tracked.sh",
        &format!(
            "cat >/dev/null\n\
             marker={running}/$$\n\
             touch \"$marker\"\n\
             ls {running} | wc -l >> {peaks}\n\
             sleep 0.3\n\
             rm -f \"$marker\"\n\
             echo '{{}}'",
            running = running.display(),
            peaks = peaks.display(),
        ),
    ));
    let provider = provider(2);
    let data_sources = provider.data_source();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let (a, b, c, d) = tokio::join!(
        data_sources.read(&config, &cancel),
        data_sources.read(&config, &cancel),
        data_sources.read(&config, &cancel),
        data_sources.read(&config, &cancel),
    );
    for outcome in [a, b, c, d] {
        outcome.expect("read");
    }
    let elapsed = started.elapsed();

    let observed: Vec<usize> = fs::read_to_string(&peaks)
        .expect("peaks")
        .lines()
        .map(|line| line.trim().parse().expect("count"))
        .collect();
    assert_eq!(observed.len(), 4);
    assert_eq!(observed.iter().max(), Some(&2), "{observed:?}");
    assert!(
        elapsed >= Duration::from_millis(550),
        "four hooks over two slots need two waves, took {elapsed:?}"
    );
}

#[tokio::test]
async fn regression_deadline_reaches_dispatch_queued_behind_gate() {
    let temp = tempdir().expect("tempdir");
    let slow = read_config(script(temp.path(), "slow.sh", "cat >/dev/null\nsleep 2\necho '{}'"));
    let marker = temp.path().join("queued-ran");
    let queued = read_config(script(
        temp.path(),
        "queued.sh",
        &format!("cat >/dev/null\ntouch {}\necho '{{}}'", marker.display()),
    ));
    let provider = provider(1);
    let data_sources = provider.data_source();
    let holder_cancel = CancellationToken::new();
    let waiter_cancel = CancellationToken::new().with_timeout(Duration::from_millis(200));

    let holder = data_sources.read(&slow, &holder_cancel);
    let waiter = async {
        // Let the holder take the only slot first.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        let outcome = data_sources.read(&queued, &waiter_cancel).await;
        (outcome, started.elapsed())
    };
    let (held, (waited, waited_for)) = tokio::join!(holder, waiter);

    held.expect("holder completes");
    let error = waited.expect_err("queued read must observe its deadline");
    assert!(error.is_cancelled(), "{error}");
    assert!(
        waited_for < Duration::from_secs(1),
        "cancellation arrived only after the slot freed: {waited_for:?}"
    );
    assert!(!marker.exists());
}

#[tokio::test]
async fn regression_cancelled_create_leaves_no_worker_behind() {
    let temp = tempdir().expect("tempdir");
    let marker = temp.path().join("late-side-effect");
    let hooks = CrudHooks::default()
        .with_command(
            CrudOp::Create,
            script(
                temp.path(),
                "create.sh",
                &format!(
                    "cat >/dev/null\nsh -c \"sleep 1; touch '{}'\" &\nwait",
                    marker.display()
                ),
            ),
        )
        .with_command(CrudOp::Read, "true")
        .with_command(CrudOp::Delete, "true");
    let plan = ResourcePlan {
        hooks,
        input: DynamicValue::Null,
        write_only_input: None,
    };

    let error = provider(0)
        .resource()
        .create(
            &plan,
            &CancellationToken::new().with_timeout(Duration::from_millis(150)),
        )
        .await
        .expect_err("create should be cancelled");
    assert!(error.is_cancelled(), "{error}");

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!marker.exists(), "forked worker ran after cancellation");
}
