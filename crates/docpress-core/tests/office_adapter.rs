//! Drives `OfficeAdapter` against shell scripts standing in for `soffice`.
//!
//! Every script is written before the first one is spawned: executing a file
//! while another thread of this process still holds it open for writing
//! fails with ETXTBSY, so all scenarios live in one sequential test.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docpress_core::adapter::{ConversionAdapter, OfficeAdapter, OfficeSettings};
use docpress_core::ConvertError;

/// Sets `$input`, `$outdir`, and `$stem` the way soffice would see them, and
/// creates the user profile directory like the real suite does.
const PARSE_ARGS: &str = r#"
input=""
outdir=""
profile=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--outdir" ]; then outdir="$arg"; fi
  case "$arg" in
    -env:UserInstallation=file://*) profile="${arg#-env:UserInstallation=file://}" ;;
  esac
  prev="$arg"
  input="$arg"
done
name=$(basename "$input")
stem="${name%.*}"
mkdir -p "$profile/user"
"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{PARSE_ARGS}\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn adapter(binary: PathBuf, profiles: &Path) -> OfficeAdapter {
    OfficeAdapter::new(OfficeSettings {
        binary,
        profile_root: profiles.to_path_buf(),
    })
}

fn read_pid(path: &Path) -> i32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("pid file {} never appeared", path.display());
}

/// Alive means present and not a zombie waiting for its reaper.
fn alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        // Non-procfs unix: fall back to signal 0.
        Err(_) if !Path::new("/proc/self").exists() => {
            // SAFETY: signal 0 performs only an existence/permission check.
            unsafe { libc::kill(pid, 0) == 0 }
        }
        Err(_) => false,
    }
}

fn profile_dirs(root: &Path) -> Vec<String> {
    std::fs::read_dir(root)
        .map(|d| {
            d.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

async fn wait_dead(pid: i32) -> bool {
    for _ in 0..100 {
        if !alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn office_adapter_scenarios() {
    let root = tempfile::tempdir().unwrap();
    let bin = root.path().join("bin");
    let work = root.path().join("work");
    let out = root.path().join("out");
    let profiles = root.path().join("profiles");
    for dir in [&bin, &work, &out] {
        std::fs::create_dir_all(dir).unwrap();
    }
    let args_log = root.path().join("args.log");
    let leader_pid = root.path().join("leader.pid");
    let helper_pid = root.path().join("helper.pid");
    let success_helper_pid = root.path().join("success-helper.pid");
    let failure_helper_pid = root.path().join("failure-helper.pid");
    let abandoned_helper_pid = root.path().join("abandoned-helper.pid");

    let succeed = script(
        &bin,
        "succeed",
        &format!(
            "echo \"$@\" > '{}'\nsleep 30 </dev/null >/dev/null 2>&1 &\necho $! > '{}'\nprintf '%%PDF-1.4 fake' > \"$outdir/$stem.pdf\"\necho \"convert $input -> $outdir/$stem.pdf\"",
            args_log.display(),
            success_helper_pid.display()
        ),
    );
    let fail = script(
        &bin,
        "fail",
        &format!(
            "sleep 30 </dev/null >/dev/null 2>&1 &\necho $! > '{}'\nprintf 'partial' > \"$outdir/$stem.pdf\"\necho 'Error: source file could not be loaded' >&2\nexit 1",
            failure_helper_pid.display()
        ),
    );
    let silent = script(&bin, "silent", "echo 'nothing to do'\nexit 0");
    let hang = script(
        &bin,
        "hang",
        &format!(
            "printf 'partial' > \"$outdir/$stem.pdf\"\nsleep 30 &\necho $! > '{}'\necho $$ > '{}'\nexec sleep 30",
            helper_pid.display(),
            leader_pid.display()
        ),
    );
    let linger = script(
        &bin,
        "linger",
        &format!(
            "printf 'partial' > \"$outdir/$stem.pdf\"\nsleep 30 </dev/null >/dev/null 2>&1 &\necho $! > '{}'\nexec sleep 30",
            abandoned_helper_pid.display()
        ),
    );
    let not_executable = bin.join("plain-file");
    std::fs::write(&not_executable, "not a program").unwrap();

    let input = work.join("3f1c_report.docx");
    std::fs::write(&input, b"PK\x03\x04").unwrap();
    let expected = out.join("3f1c_report.pdf");
    let generous = Duration::from_secs(10);

    // Success: output discovered at the derived path, profile cleaned up.
    let produced = adapter(succeed, &profiles)
        .convert(&input, &out, generous)
        .await
        .unwrap();
    assert_eq!(produced, expected);
    assert_eq!(std::fs::read(&expected).unwrap(), b"%PDF-1.4 fake");
    let args = std::fs::read_to_string(&args_log).unwrap();
    assert!(args.contains("--headless"), "{args}");
    assert!(args.contains("--convert-to pdf"), "{args}");
    assert!(args.contains("-env:UserInstallation=file://"), "{args}");
    let leftover_profiles = std::fs::read_dir(&profiles)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftover_profiles, 0);
    let helper = read_pid(&success_helper_pid);
    assert!(wait_dead(helper).await, "helper {helper} outlived a successful conversion");
    std::fs::remove_file(&expected).unwrap();

    // Non-zero exit: diagnostic surfaced, partial output removed.
    let err = adapter(fail, &profiles)
        .convert(&input, &out, generous)
        .await
        .unwrap_err();
    match &err {
        ConvertError::ConversionFailed { detail } => {
            assert!(detail.contains("source file could not be loaded"), "{detail}")
        }
        other => panic!("expected ConversionFailed, got {other:?}"),
    }
    assert!(!expected.exists());
    let helper = read_pid(&failure_helper_pid);
    assert!(wait_dead(helper).await, "helper {helper} outlived a failed conversion");

    // Zero exit without a file is not success.
    let err = adapter(silent, &profiles)
        .convert(&input, &out, generous)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::OutputMissing(_)), "{err:?}");
    assert!(err.to_string().contains("nothing to do"));

    // Unusable binary fails fast.
    let unusable = adapter(not_executable, &profiles);
    assert!(!unusable.is_available().await);
    let err = unusable.convert(&input, &out, generous).await.unwrap_err();
    assert!(matches!(err, ConvertError::EngineUnavailable(_)), "{err:?}");

    // Timeout: the whole process group dies and nothing is left behind.
    let hanging = adapter(hang, &profiles);
    assert!(hanging.is_available().await);
    let started = std::time::Instant::now();
    let err = hanging
        .convert(&input, &out, Duration::from_millis(750))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::Timeout(_)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!expected.exists(), "partial output must be removed");

    let leader = read_pid(&leader_pid);
    let helper = read_pid(&helper_pid);
    assert!(wait_dead(leader).await, "converter {leader} still running");
    assert!(wait_dead(helper).await, "converter helper {helper} still running");

    assert!(profile_dirs(&profiles).is_empty());

    // Abandoned request: dropping the future kills the group and removes
    // the profile and the partial output.
    let abandoned = adapter(linger, &profiles);
    let mut conversion = Box::pin(abandoned.convert(&input, &out, Duration::from_secs(60)));
    let helper = loop {
        tokio::select! {
            result = &mut conversion => panic!("lingering converter finished: {result:?}"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {
                if let Some(pid) = std::fs::read_to_string(&abandoned_helper_pid)
                    .ok()
                    .and_then(|t| t.trim().parse::<i32>().ok())
                {
                    break pid;
                }
            }
        }
    };
    drop(conversion);
    assert!(wait_dead(helper).await, "helper {helper} outlived an abandoned conversion");
    assert_eq!(profile_dirs(&profiles), Vec::<String>::new());
    assert!(!expected.exists(), "partial output must be removed");
}
