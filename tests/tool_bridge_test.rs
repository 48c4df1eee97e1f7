use std::time::Duration;

use anyhow::Result;
use repl_runner::{
    execution::{ExecutionOutcome, Executor},
    functions,
    process::Interpreter,
    server::ToolServer,
};
use serde_json::{json, Value};

fn executor() -> Option<Executor> {
    match Interpreter::detect() {
        Ok(interp) => Some(Executor::new(interp)),
        Err(e) => {
            println!("skipping: {}", e);
            None
        }
    }
}

fn call(id: u64, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "python_repl", "arguments": arguments}
    })
    .to_string()
}

#[tokio::test]
async fn test_invoke_direct_tool_call() -> Result<()> {
    let Some(mut exec) = executor() else { return Ok(()) };
    let outcome = functions::invoke(&mut exec, r#"{"command": "print(6 * 7)", "timeout": 10}"#, None).await?;
    assert_eq!(outcome, ExecutionOutcome::Output("42\n".into()));

    assert!(functions::invoke(&mut exec, "not json", None).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_stdio_session() -> Result<()> {
    let Some(exec) = executor() else { return Ok(()) };
    let mut server = ToolServer::new(exec, Some(Duration::from_secs(10)));

    let input = [
        json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        call(1, json!({"command": "```python\ntotal = 40 + 2\nprint(total)\n```"})),
        call(2, json!({"command": "print(total + 1)"})),
        call(3, json!({"command": "1/0"})),
        call(4, json!({"command": "while True: pass", "timeout": 0.5})),
    ]
    .join("\n");

    let mut out: Vec<u8> = Vec::new();
    server.serve(input.as_bytes(), &mut out).await?;

    let responses: Vec<Value> = String::from_utf8(out)?
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<_, _>>()?;
    assert_eq!(responses.len(), 5);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "repl-runner");

    let text = |r: &Value| r["result"]["content"][0]["text"].as_str().unwrap_or_default().to_string();
    assert_eq!(text(&responses[1]), "42\n");
    assert_eq!(responses[1]["result"]["isError"], false);
    assert_eq!(text(&responses[2]), "43\n");
    assert!(text(&responses[3]).starts_with("ZeroDivisionError"));
    assert_eq!(responses[3]["result"]["isError"], true);
    assert_eq!(text(&responses[4]), "Execution timed out");
    assert_eq!(responses[4]["result"]["isError"], true);

    assert_eq!(server.executor().bindings().lookup("total"), Some(&json!(42)));
    Ok(())
}
