//! Python worker bootstrap and command line.
//!
//! The bootstrap reads one JSON request from stdin, runs the code with
//! `sys.stdout` redirected into a buffer and writes exactly one JSON reply line
//! to a duplicate of its original stdout. fd 1 itself is pointed at stderr
//! before any user code runs, so low-level writes cannot corrupt the reply.
//! Unencodable characters (lone surrogates) in output and fault text are
//! backslash-escaped; bindings holding them are skipped.

use std::{path::Path, process::Stdio};

use tokio::process::Command;

pub const BOOTSTRAP: &str = r#"
import io
import json
import os
import sys

_channel = os.fdopen(os.dup(1), "w", encoding="utf-8")
os.dup2(2, 1)


def _text(value):
    return value.encode("utf-8", "backslashreplace").decode("utf-8")


def _portable(scope):
    kept, skipped = {}, []
    for name, value in list(scope.items()):
        if name.startswith("__"):
            continue
        try:
            json.dumps(value, allow_nan=False, ensure_ascii=False).encode("utf-8")
        except (TypeError, ValueError, RecursionError):
            skipped.append(name)
            continue
        kept[name] = value
    return kept, skipped


def _main():
    request = json.loads(sys.stdin.read() or "{}")
    scope_globals = request.get("globals") or {}
    scope_locals = request.get("locals") or {}
    buffer = io.StringIO()
    saved = sys.stdout
    sys.stdout = buffer
    try:
        exec(request.get("code", ""), scope_globals, scope_locals)
    except BaseException as exc:
        sys.stdout = saved
        try:
            message = _text(str(exc))
        except Exception:
            message = ""
        reply = {"status": "fault", "kind": _text(type(exc).__name__), "message": message}
    else:
        sys.stdout = saved
        reply = {"status": "ok", "stdout": _text(buffer.getvalue())}
    kept_globals, skipped_globals = _portable(scope_globals)
    kept_locals, skipped_locals = _portable(scope_locals)
    reply["bindings"] = {"globals": kept_globals, "locals": kept_locals}
    reply["skipped"] = sorted(set(skipped_globals + skipped_locals))
    _channel.write(json.dumps(reply, allow_nan=False))
    _channel.write("\n")
    _channel.flush()


_main()
"#;

/// Build the worker command: unbuffered interpreter running [`BOOTSTRAP`] with all
/// three standard streams piped. The child is killed if its handle is dropped.
pub fn worker_command(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg("-u") // unbuffered
        .arg("-c")
        .arg(BOOTSTRAP)
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}
