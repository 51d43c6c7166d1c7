// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Physical-identifier assignment.
//!
//! Every successful operation must report a stable physical identifier.
//! The precedence is: handler-assigned id, then the id already carried in
//! the event, then a synthesized one. Resolution happens exactly once per
//! logical operation, in the terminal invocation; intermediate payloads
//! carry only an id the orchestrator itself supplied, so whatever value is
//! observed first is the value reported.

use rand::Rng;

use crate::event::InvocationEvent;

const SUFFIX_LEN: usize = 8;
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Pick the physical identifier to report and carry forward.
pub fn resolve(event: &InvocationEvent, handler_id: Option<String>) -> String {
    if let Some(id) = handler_id {
        return id;
    }
    if let Some(id) = &event.physical_resource_id {
        return id.clone();
    }
    synthesize(&event.stack_id, &event.logical_resource_id)
}

/// Build `<stack-name>_<logical-id>_<random-8>` from the stack identifier's
/// second path segment, falling back to the whole stack id when it has no
/// `/` separator.
fn synthesize(stack_id: &str, logical_id: &str) -> String {
    let stack_name = stack_id.split('/').nth(1).unwrap_or(stack_id);
    format!("{}_{}_{}", stack_name, logical_id, random_suffix())
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> InvocationEvent {
        serde_json::from_value(serde_json::json!({
            "RequestType": "Create",
            "StackId": "arn:aws:stack/demo-stack/11112222",
            "RequestId": "req-1",
            "LogicalResourceId": "Workspace",
            "ResponseURL": "https://callback.example/put"
        }))
        .unwrap()
    }

    #[test]
    fn test_handler_id_wins_over_event_id() {
        let mut event = sample_event();
        event.physical_resource_id = Some("i-existing".to_string());

        assert_eq!(
            resolve(&event, Some("i-handler".to_string())),
            "i-handler"
        );
    }

    #[test]
    fn test_event_id_reused_when_handler_silent() {
        let mut event = sample_event();
        event.physical_resource_id = Some("i-existing".to_string());

        assert_eq!(resolve(&event, None), "i-existing");
    }

    #[test]
    fn test_synthesized_id_shape() {
        let id = resolve(&sample_event(), None);
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "demo-stack");
        assert_eq!(parts[1], "Workspace");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_synthesized_ids_differ_across_calls() {
        let event = sample_event();
        assert_ne!(resolve(&event, None), resolve(&event, None));
    }

    #[test]
    fn test_stack_id_without_separator_is_used_whole() {
        let mut event = sample_event();
        event.stack_id = "plain-id".to_string();

        let id = resolve(&event, None);
        assert!(id.starts_with("plain-id_Workspace_"));
    }
}
