//! Minimal DevTools protocol client over a page websocket.
//!
//! Commands are issued one at a time; events that arrive while waiting for a
//! response are discarded.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{RelayError, Result};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

const CONNECTION_CLOSED: &str = "devtools connection closed";
const SEND_FAILED: &str = "send failed";

/// Collects every string property on live heap objects that starts with the
/// prefix passed as the first argument.
const HARVEST_FUNCTION: &str = r"function(prefix) {
    const found = [];
    for (const obj of this) {
        try {
            for (const key of Object.keys(obj)) {
                const value = obj[key];
                if (typeof value === 'string' && value.startsWith(prefix)) {
                    found.push(value);
                }
            }
        } catch (e) {}
    }
    return found;
}";

/// A connected page session.
pub struct CdpSession {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl CdpSession {
    /// Connect to a page target's websocket.
    ///
    /// # Errors
    /// [`RelayError::Automation`] if the handshake fails.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (socket, _) = connect_async(ws_url)
            .await
            .map_err(|e| RelayError::Automation(format!("devtools connect {ws_url}: {e}")))?;
        Ok(Self { socket, next_id: 0 })
    }

    /// Send one command and wait for its result object.
    ///
    /// # Errors
    /// [`RelayError::Automation`] on protocol errors or a closed socket.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let frame = json!({ "id": id, "method": method, "params": params });
        self.socket
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| RelayError::Automation(format!("{method}: {SEND_FAILED}: {e}")))?;

        while let Some(message) = self.socket.next().await {
            let message =
                message.map_err(|e| RelayError::Automation(format!("{method}: {e}")))?;
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(reply) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = reply.get("error") {
                return Err(RelayError::Automation(format!("{method}: {error}")));
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }

        Err(RelayError::Automation(format!("{method}: {CONNECTION_CLOSED}")))
    }

    /// Evaluate an expression and return its JSON value.
    async fn evaluate_value(&mut self, expression: &str) -> Result<Value> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(RelayError::Automation(format!(
                "script exception: {details}"
            )));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// # Errors
    /// [`RelayError::Automation`] if navigation is refused.
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "Navigating");
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(RelayError::Automation(format!("navigate {url}: {error}")));
        }
        Ok(())
    }

    /// Poll until `selector` matches an element. Unbounded; callers apply a deadline.
    ///
    /// Evaluation errors while the page is between documents (redirects,
    /// destroyed execution contexts) count as "not yet".
    ///
    /// # Errors
    /// [`RelayError::Automation`] once the devtools connection is gone.
    pub async fn wait_for_selector(&mut self, selector: &str) -> Result<()> {
        let expression = format!("document.querySelector({}) !== null", js_string(selector));
        loop {
            let outcome = self.evaluate_value(&expression).await;
            match selector_state(outcome) {
                SelectorState::Found => return Ok(()),
                SelectorState::Pending => {}
                SelectorState::Retry(e) => {
                    tracing::debug!(selector, error = %e, "Selector probe failed, retrying");
                }
                SelectorState::Fatal(e) => return Err(e),
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    /// Focus `selector` and insert `text` as if typed.
    ///
    /// # Errors
    /// [`RelayError::Automation`] on protocol failure.
    pub async fn type_into(&mut self, selector: &str, text: &str) -> Result<()> {
        let focus = format!("document.querySelector({}).focus()", js_string(selector));
        self.evaluate_value(&focus).await?;
        self.call("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    /// Left-click the centre of `selector`'s bounding box.
    ///
    /// # Errors
    /// [`RelayError::Automation`] if the element has no box or on protocol failure.
    pub async fn click(&mut self, selector: &str) -> Result<()> {
        let expression = format!(
            "(() => {{ const r = document.querySelector({}).getBoundingClientRect(); \
             return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }}; }})()",
            js_string(selector)
        );
        let point = self.evaluate_value(&expression).await?;
        let (Some(x), Some(y)) = (
            point.get("x").and_then(Value::as_f64),
            point.get("y").and_then(Value::as_f64),
        ) else {
            return Err(RelayError::Automation(format!(
                "no bounding box for {selector}"
            )));
        };

        for kind in ["mousePressed", "mouseReleased"] {
            self.call(
                "Input.dispatchMouseEvent",
                json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
            )
            .await?;
        }
        Ok(())
    }

    /// Scan the page heap for strings starting with `prefix`.
    ///
    /// # Errors
    /// [`RelayError::Automation`] on protocol failure.
    pub async fn harvest_strings(&mut self, prefix: &str) -> Result<Vec<String>> {
        let prototype = self
            .call("Runtime.evaluate", json!({ "expression": "Object.prototype" }))
            .await?;
        let prototype_id = object_id(&prototype, "/result/objectId", "Object.prototype")?;

        let objects = self
            .call(
                "Runtime.queryObjects",
                json!({ "prototypeObjectId": prototype_id }),
            )
            .await?;
        let objects_id = object_id(&objects, "/objects/objectId", "queryObjects")?;

        let found = self
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": objects_id,
                    "functionDeclaration": HARVEST_FUNCTION,
                    "arguments": [{ "value": prefix }],
                    "returnByValue": true,
                }),
            )
            .await?;

        let _ = self
            .call("Runtime.releaseObject", json!({ "objectId": objects_id }))
            .await;

        Ok(found
            .pointer("/result/value")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Outcome of one selector probe.
#[derive(Debug)]
enum SelectorState {
    Found,
    Pending,
    Retry(RelayError),
    Fatal(RelayError),
}

/// Classify a selector probe. Only a lost connection is terminal.
fn selector_state(outcome: Result<Value>) -> SelectorState {
    match outcome {
        Ok(Value::Bool(true)) => SelectorState::Found,
        Ok(_) => SelectorState::Pending,
        Err(e) if connection_lost(&e) => SelectorState::Fatal(e),
        Err(e) => SelectorState::Retry(e),
    }
}

fn connection_lost(error: &RelayError) -> bool {
    match error {
        RelayError::Automation(message) => {
            message.contains(CONNECTION_CLOSED) || message.contains(SEND_FAILED)
        }
        _ => true,
    }
}

fn object_id(result: &Value, pointer: &str, what: &str) -> Result<String> {
    result
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::Automation(format!("{what}: no object handle")))
}

/// Quote `raw` as a JavaScript string literal.
fn js_string(raw: &str) -> String {
    Value::String(raw.to_string()).to_string()
}
