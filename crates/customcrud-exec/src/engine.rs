use std::{io, process::Stdio, time::Duration};

use serde_json::{Map, Value};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
};

use crate::{
    CancellationToken, ExecError, ExecutionPayload, ExecutionResult, SensitiveMasker,
};

/// Exit code reported when the process was terminated by a signal.
pub const EXIT_CODE_SIGNALLED: i32 = -1;

const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
const TEXT_FILE_BUSY_ERRNO: i32 = 26;

/// Runs one hook: `argv[0]` with the remaining arguments, no shell.
///
/// The payload is written to stdin as a single JSON document and stdin is then
/// closed. stdout and stderr are captured whole. A non-zero exit status, an
/// unparsable stdout, or cancellation are reported as [`ExecError`] values that
/// still carry the captured output; empty stdout succeeds with no result.
#[tracing::instrument(
    name = "customcrud_exec.execute",
    skip(argv, payload, masker, cancel),
    fields(program = argv.first().map(String::as_str).unwrap_or(""))
)]
pub async fn execute(
    argv: &[String],
    payload: &ExecutionPayload,
    masker: &SensitiveMasker,
    cancel: &CancellationToken,
) -> Result<ExecutionResult, ExecError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ExecError::EmptyCommand);
    };
    let payload_text = serde_json::to_string(payload).map_err(ExecError::SerializePayload)?;
    let mut result = ExecutionResult {
        masked_payload: masker.mask_json(&payload_text),
        payload: payload_text,
        ..ExecutionResult::default()
    };
    tracing::debug!(
        program = %program,
        payload = %result.masked_payload,
        "executing hook"
    );

    if cancel.is_cancelled() {
        return Err(ExecError::Cancelled {
            result: Box::new(result),
        });
    }

    let mut command = Command::new(program);
    command.kill_on_drop(true);
    // Own process group so cancellation reaches anything the hook forked.
    #[cfg(unix)]
    command.process_group(0);
    command.args(args);
    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    let mut child = spawn_with_text_file_busy_retry(&mut command, program).await?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let payload_bytes = result.payload.clone().into_bytes();
    let exchange = async {
        tokio::join!(
            write_payload(stdin, &payload_bytes),
            read_stream(stdout),
            read_stream(stderr),
            child.wait(),
        )
    };
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        joined = exchange => Some(joined),
    };

    let Some((written, stdout, stderr, status)) = outcome else {
        terminate(&mut child).await;
        result.exit_code = EXIT_CODE_SIGNALLED;
        tracing::debug!(program = %program, "hook cancelled");
        return Err(ExecError::Cancelled {
            result: Box::new(result),
        });
    };

    let captured = written.and_then(|()| Ok((stdout?, stderr?, status?)));
    let (stdout, stderr, status) = match captured {
        Ok(captured) => captured,
        Err(source) => return Err(io_failure(source, result)),
    };

    result.exit_code = status.code().unwrap_or(EXIT_CODE_SIGNALLED);
    result.masked_stdout = masker.mask_json(&stdout);
    result.masked_stderr = masker.mask_values(&stderr);
    result.stdout = stdout;
    result.stderr = stderr;

    if !status.success() {
        tracing::debug!(
            program = %program,
            exit_code = result.exit_code,
            stderr = %result.masked_stderr,
            "hook failed"
        );
        return Err(ExecError::NonZeroExit {
            exit_code: result.exit_code,
            result: Box::new(result),
        });
    }

    let trimmed = result.stdout.trim();
    if !trimmed.is_empty() {
        match serde_json::from_str::<Map<String, Value>>(trimmed) {
            Ok(parsed) => result.result = Some(parsed),
            Err(source) => {
                return Err(ExecError::InvalidOutput {
                    source,
                    result: Box::new(result),
                })
            }
        }
    }

    tracing::debug!(
        program = %program,
        exit_code = result.exit_code,
        stdout = %result.masked_stdout,
        "hook completed"
    );
    Ok(result)
}

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    program: &str,
) -> Result<Child, ExecError> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(source) => {
                return Err(ExecError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
}

async fn write_payload(stdin: Option<ChildStdin>, bytes: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(bytes).await {
        // Hooks are free to ignore their input and exit early.
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        other => other?,
    }
    match stdin.shutdown().await {
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn read_stream<R>(stream: Option<R>) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(String::new());
    };
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// The exit status was never observed, so the report cannot claim one.
fn io_failure(source: io::Error, mut result: ExecutionResult) -> ExecError {
    result.exit_code = EXIT_CODE_SIGNALLED;
    ExecError::Io {
        source,
        result: Box::new(result),
    }
}

/// Kills the hook's whole process group, then the child itself, and reaps it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::{
            sys::signal::{killpg, Signal},
            unistd::Pid,
        };
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(error) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                tracing::debug!(error = %error, "failed to kill cancelled hook process group");
            }
        }
    }
    if let Err(error) = child.kill().await {
        tracing::debug!(error = %error, "failed to kill cancelled hook");
    }
}
