//! A minimal stdio MCP server used only by `conduit-supervisor`'s tests, in
//! place of a real `uvx`-launched process (SPEC_FULL.md §8). It exposes a
//! single tool, `echo`, whose `tools/call` result echoes back its `text`
//! argument.

use std::io::{self, BufRead, Write};

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };

        let id = request.get("id").cloned();
        let Some(id) = id else {
            // Notification, e.g. notifications/initialized: no reply.
            continue;
        };

        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or_default();
        let response = match method {
            "tools/list" => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [
                        {
                            "name": "echo",
                            "description": "echoes its text argument back",
                            "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
                        }
                    ]
                }
            }),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(serde_json::Value::Null);
                let text = params
                    .get("arguments")
                    .and_then(|a| a.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string();
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{"type": "text", "text": text}],
                        "isError": false
                    }
                })
            }
            _ => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method not found: {method}")}
            }),
        };

        let _ = writeln!(stdout, "{}", serde_json::to_string(&response).unwrap());
        let _ = stdout.flush();
    }
}
