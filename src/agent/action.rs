use crate::agent::cdp::CdpClient;
use crate::agent::types::{ActionResult, AgentAction, ScrollDirection};

/// Execute an agent action against the browser.
///
/// Element-level failures come back as unsuccessful results so the step loop
/// can count them; transport failures propagate as errors.
pub async fn execute_action(
    client: &CdpClient,
    action: &AgentAction,
) -> Result<ActionResult, String> {
    match action {
        AgentAction::Navigate { url } => {
            client.navigate(url).await?;
            Ok(ActionResult {
                success: true,
                message: format!("Navigated to {}", url),
                data: None,
            })
        }

        AgentAction::Click { selector } => match client.click(selector).await {
            Ok(_) => Ok(ActionResult {
                success: true,
                message: format!("Clicked {}", selector),
                data: None,
            }),
            Err(e) => Ok(ActionResult {
                success: false,
                message: format!("Failed to click {}: {}", selector, e),
                data: None,
            }),
        },

        AgentAction::Type { selector, text } => match client.type_text(selector, text).await {
            Ok(_) => Ok(ActionResult {
                success: true,
                message: format!("Typed into {}", selector),
                data: None,
            }),
            Err(e) => Ok(ActionResult {
                success: false,
                message: format!("Failed to type into {}: {}", selector, e),
                data: None,
            }),
        },

        AgentAction::PressKey { key } => match client.press_key(key).await {
            Ok(_) => Ok(ActionResult {
                success: true,
                message: format!("Pressed key: {}", key),
                data: None,
            }),
            Err(e) => Ok(ActionResult {
                success: false,
                message: format!("Failed to press key {}: {}", key, e),
                data: None,
            }),
        },

        AgentAction::Scroll { direction, amount } => {
            let dir_str = match direction {
                ScrollDirection::Up => "up",
                ScrollDirection::Down => "down",
                ScrollDirection::Left => "left",
                ScrollDirection::Right => "right",
            };
            match client.scroll(dir_str, *amount).await {
                Ok(_) => Ok(ActionResult {
                    success: true,
                    message: format!("Scrolled {} by {}", dir_str, amount),
                    data: None,
                }),
                Err(e) => Ok(ActionResult {
                    success: false,
                    message: format!("Failed to scroll: {}", e),
                    data: None,
                }),
            }
        }

        AgentAction::Wait {
            duration_ms,
            selector,
        } => {
            if let Some(ms) = duration_ms {
                client.wait(*ms).await?;
                Ok(ActionResult {
                    success: true,
                    message: format!("Waited {} ms", ms),
                    data: None,
                })
            } else if let Some(sel) = selector {
                match client.wait_for_element(sel, 10000).await {
                    Ok(_) => Ok(ActionResult {
                        success: true,
                        message: format!("Element found: {}", sel),
                        data: None,
                    }),
                    Err(e) => Ok(ActionResult {
                        success: false,
                        message: format!("Element not found: {}", e),
                        data: None,
                    }),
                }
            } else {
                client.wait(1000).await?;
                Ok(ActionResult {
                    success: true,
                    message: "Waited 1000 ms (default)".to_string(),
                    data: None,
                })
            }
        }

        AgentAction::Extract { selectors } => match client.extract_data(selectors).await {
            Ok(data) => Ok(ActionResult {
                success: true,
                message: "Data extracted".to_string(),
                data: Some(data),
            }),
            Err(e) => Ok(ActionResult {
                success: false,
                message: format!("Extraction failed: {}", e),
                data: None,
            }),
        },

        AgentAction::GoBack => {
            client.go_back().await?;
            Ok(ActionResult {
                success: true,
                message: "Went back".to_string(),
                data: None,
            })
        }

        AgentAction::None => Ok(ActionResult {
            success: true,
            message: "No action".to_string(),
            data: None,
        }),
    }
}
