//! CDP (Chrome DevTools Protocol) client over a raw WebSocket.
//!
//! Attaches to an already-running browser given its debugging endpoint;
//! launching and lifecycle of the browser belong to the caller.

use crate::agent::types::DomContext;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Per-command response timeout
const COMMAND_TIMEOUT_SECS: u64 = 30;

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

/// CDP client bound to one page target.
pub struct CdpClient {
    ws_tx: Arc<Mutex<WsSink>>,
    /// Waiters for in-flight commands, keyed by message id
    responses: Arc<Mutex<HashMap<u32, tokio::sync::oneshot::Sender<Value>>>>,
    msg_id: Arc<Mutex<u32>>,
    target_id: String,
}

impl CdpClient {
    /// Connect to a page target of a running browser.
    ///
    /// Picks the target with the given id, or the first `page` target when no
    /// id is specified.
    pub async fn attach(cdp_url: &str, target_id: Option<&str>) -> Result<Self, String> {
        let list_url = format!("{}/json/list", cdp_url.trim_end_matches('/'));

        let response = reqwest::get(&list_url)
            .await
            .map_err(|e| format!("Failed to reach CDP endpoint {}: {}", cdp_url, e))?;
        if !response.status().is_success() {
            return Err(format!("CDP endpoint error: HTTP {}", response.status()));
        }
        let targets: Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse targets response: {}", e))?;

        let target = targets
            .as_array()
            .and_then(|arr| {
                arr.iter().find(|t| match target_id {
                    Some(id) => t.get("id").and_then(Value::as_str) == Some(id),
                    None => t.get("type").and_then(Value::as_str) == Some("page"),
                })
            })
            .ok_or_else(|| match target_id {
                Some(id) => format!("Target {} not found", id),
                None => "No page target found".to_string(),
            })?;

        let ws_url = target
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| "No webSocketDebuggerUrl in target".to_string())?;
        let resolved_target_id = target
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("Failed to connect WebSocket: {}", e))?;
        let (tx, mut rx) = ws_stream.split();

        let responses: Arc<Mutex<HashMap<u32, tokio::sync::oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // Reader task: route responses to waiting senders by message id
        let reader_responses = responses.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if let Ok(json) = serde_json::from_str::<Value>(&text) {
                            if let Some(id) = json.get("id").and_then(Value::as_u64) {
                                if let Some(sender) =
                                    reader_responses.lock().await.remove(&(id as u32))
                                {
                                    let _ = sender.send(json);
                                }
                            }
                        }
                        tracing::trace!("CDP received: {}", text.chars().take(100).collect::<String>());
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("CDP WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("CDP WebSocket error: {:?}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        let client = Self {
            ws_tx: Arc::new(Mutex::new(tx)),
            responses,
            msg_id: Arc::new(Mutex::new(1)),
            target_id: resolved_target_id,
        };

        client.send_command("Page.enable", json!({})).await?;
        client.send_command("Runtime.enable", json!({})).await?;
        tracing::info!("CDP client attached to target {}", client.target_id);

        Ok(client)
    }

    /// Send a CDP command and wait for its response
    async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        let (id, rx) = {
            let mut msg_id = self.msg_id.lock().await;
            *msg_id += 1;
            let id = *msg_id - 1;

            let (tx, rx) = tokio::sync::oneshot::channel();
            self.responses.lock().await.insert(id, tx);
            (id, rx)
        };

        let command = json!({
            "id": id,
            "method": method,
            "params": params
        });

        {
            let mut tx_guard = self.ws_tx.lock().await;
            tx_guard
                .send(WsMessage::Text(command.to_string()))
                .await
                .map_err(|e| format!("Failed to send command: {}", e))?;
        }

        match tokio::time::timeout(
            tokio::time::Duration::from_secs(COMMAND_TIMEOUT_SECS),
            rx,
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err("Response channel closed".to_string()),
            Err(_) => Err("Command timeout".to_string()),
        }
    }

    /// Evaluate a JS expression and return its value
    async fn eval_value(&self, expression: &str) -> Result<Value, String> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true
                }),
            )
            .await?;

        Ok(result
            .get("result")
            .and_then(|r| r.get("result"))
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), String> {
        let _ = self
            .send_command("Page.navigate", json!({"url": url}))
            .await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    /// Get current URL from the page
    pub async fn get_url(&self) -> Result<String, String> {
        match self.eval_value("window.location.href").await? {
            Value::String(url) => Ok(url),
            _ => Ok(String::new()),
        }
    }

    /// Get page title
    pub async fn get_title(&self) -> Result<Option<String>, String> {
        match self.eval_value("document.title").await? {
            Value::String(title) => Ok(Some(title)),
            _ => Ok(None),
        }
    }

    /// Click an element by selector
    pub async fn click(&self, selector: &str) -> Result<(), String> {
        let escaped = escape_selector(selector);
        let clicked = self
            .eval_value(&format!(
                "(function() {{ const el = document.querySelector('{}'); if(el) {{ el.click(); return true; }} return false; }})()",
                escaped
            ))
            .await?
            .as_bool()
            .unwrap_or(false);

        if clicked {
            tracing::debug!("Clicked element: {}", selector);
            Ok(())
        } else {
            Err(format!("Element not found: {}", selector))
        }
    }

    /// Type text into an element
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<(), String> {
        let escaped_selector = escape_selector(selector);
        let escaped_text = text.replace('\\', "\\\\").replace('\'', "\\'");

        let typed = self
            .eval_value(&format!(
                "(function() {{ const el = document.querySelector('{}'); if(el) {{ el.focus(); el.value = '{}'; el.dispatchEvent(new Event('input', {{bubbles: true}})); return true; }} return false; }})()",
                escaped_selector, escaped_text
            ))
            .await?
            .as_bool()
            .unwrap_or(false);

        if typed {
            tracing::debug!("Typed into element: {}", selector);
            Ok(())
        } else {
            Err(format!("Element not found: {}", selector))
        }
    }

    /// Press a key
    pub async fn press_key(&self, key: &str) -> Result<(), String> {
        let key_code = match key {
            "Enter" => 13,
            "Tab" => 9,
            "Escape" => 27,
            "Backspace" => 8,
            "ArrowUp" => 38,
            "ArrowDown" => 40,
            "ArrowLeft" => 37,
            "ArrowRight" => 39,
            _ => key.chars().next().map(|c| c as i32).unwrap_or(0),
        };

        for event_type in ["keyDown", "keyUp"] {
            self.send_command(
                "Input.dispatchKeyEvent",
                json!({
                    "type": event_type,
                    "key": key,
                    "code": key,
                    "windowsVirtualKeyCode": key_code
                }),
            )
            .await?;
        }

        tracing::debug!("Pressed key: {}", key);
        Ok(())
    }

    /// Scroll the page
    pub async fn scroll(&self, direction: &str, amount: u32) -> Result<(), String> {
        let scroll_amount = amount as i32;
        let (x, y) = match direction {
            "up" => (0, -scroll_amount),
            "down" => (0, scroll_amount),
            "left" => (-scroll_amount, 0),
            "right" => (scroll_amount, 0),
            _ => (0, scroll_amount),
        };

        self.eval_value(&format!("window.scrollBy({}, {})", x, y))
            .await?;
        tracing::debug!("Scrolled: {} by {}", direction, amount);
        Ok(())
    }

    /// Wait for an element to appear
    pub async fn wait_for_element(&self, selector: &str, timeout_ms: u64) -> Result<(), String> {
        let timeout = std::time::Duration::from_millis(timeout_ms);
        let start = std::time::Instant::now();
        let escaped = escape_selector(selector);

        loop {
            let found = self
                .eval_value(&format!("!!document.querySelector('{}')", escaped))
                .await?
                .as_bool()
                .unwrap_or(false);

            if found {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(format!("Timeout waiting for element: {}", selector));
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    /// Go back in history
    pub async fn go_back(&self) -> Result<(), String> {
        self.eval_value("history.back()").await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        Ok(())
    }

    /// Wait for duration
    pub async fn wait(&self, duration_ms: u64) -> Result<(), String> {
        tokio::time::sleep(tokio::time::Duration::from_millis(duration_ms)).await;
        Ok(())
    }

    /// Extract text content for each named selector
    pub async fn extract_data(
        &self,
        selectors: &HashMap<String, String>,
    ) -> Result<Value, String> {
        let mut data = serde_json::Map::new();
        for (name, selector) in selectors {
            let escaped = escape_selector(selector);
            let value = self
                .eval_value(&format!(
                    "(function() {{ const el = document.querySelector('{}'); return el ? el.textContent.trim() : null; }})()",
                    escaped
                ))
                .await?;
            data.insert(name.clone(), value);
        }
        Ok(Value::Object(data))
    }

    /// Collect a simplified page snapshot for the model
    pub async fn get_dom_context(&self) -> Result<DomContext, String> {
        let js = r##"
(function() {
    function cssPath(el) {
        if (el.id) return '#' + el.id;
        let path = el.tagName.toLowerCase();
        if (el.className && typeof el.className === 'string') {
            const cls = el.className.trim().split(/\s+/).slice(0, 2).join('.');
            if (cls) path += '.' + cls;
        }
        return path;
    }
    function isVisible(el) {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    }
    const tags = 'a, button, input, select, textarea, [role=button], [onclick]';
    const elements = [];
    document.querySelectorAll(tags).forEach(function(el) {
        if (elements.length >= 100) return;
        elements.push({
            tag: el.tagName.toLowerCase(),
            selector: cssPath(el),
            text: (el.textContent || '').trim().slice(0, 80) || null,
            input_type: el.getAttribute('type'),
            placeholder: el.getAttribute('placeholder'),
            aria_label: el.getAttribute('aria-label'),
            visible: isVisible(el),
            clickable: true
        });
    });
    return {
        url: window.location.href,
        title: document.title || null,
        elements: elements
    };
})()
"##;

        let value = self.eval_value(js).await?;
        serde_json::from_value(value).map_err(|e| format!("Failed to parse page snapshot: {}", e))
    }

    /// Close the WebSocket connection
    pub async fn close(&self) {
        let mut tx = self.ws_tx.lock().await;
        let _ = tx.send(WsMessage::Close(None)).await;
    }
}

fn escape_selector(selector: &str) -> String {
    selector.replace('\\', "\\\\").replace('\'', "\\'")
}

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

/// Direct command executor for the fast path. One-shot, no agent involved.
#[async_trait]
pub trait FastCommander: Send + Sync {
    /// Navigate the given target to a URL
    async fn navigate(&self, cdp_url: &str, target_id: &str, url: &str) -> Result<(), String>;
}

/// Production commander backed by a short-lived CDP connection.
pub struct CdpCommander;

#[async_trait]
impl FastCommander for CdpCommander {
    async fn navigate(&self, cdp_url: &str, target_id: &str, url: &str) -> Result<(), String> {
        let client = CdpClient::attach(cdp_url, Some(target_id)).await?;
        let result = client.navigate(url).await;
        client.close().await;
        result
    }
}
