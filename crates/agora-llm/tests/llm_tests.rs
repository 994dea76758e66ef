#[cfg(test)]
mod tests {
    use agora_core::{AgoraError, Message, Role};
    use agora_llm::mock::{MockProvider, MockResponse};
    use agora_llm::openai::parse_response;
    use agora_llm::provider::{LlmProvider, LlmRequest, StopReason};
    use agora_llm::router::ModelRouter;
    use serde_json::json;
    use std::sync::Arc;

    fn make_request(model: &str) -> LlmRequest {
        let mut req = LlmRequest::new(model);
        req.messages = vec![Message::text(Role::User, "Hello")];
        req
    }

    // ── Router ─────────────────────────────────────────────────

    mod router {
        use super::*;

        #[tokio::test]
        async fn test_complete_with_prefix_resolution() {
            let mock = Arc::new(MockProvider::new("testprovider").with_response("Hello from mock!"));
            let router = ModelRouter::new().with_provider(mock.clone());
            let resp = router
                .complete(&make_request("testprovider/gpt-4o"))
                .await
                .unwrap();
            assert_eq!(resp.content, "Hello from mock!");
            // The provider sees the model id without its prefix.
            assert_eq!(mock.recorded_requests()[0].model, "gpt-4o");
        }

        #[tokio::test]
        async fn test_model_not_found() {
            let router = ModelRouter::new();
            let result = router.complete(&make_request("nonexistent/model")).await;
            assert!(matches!(result, Err(AgoraError::ModelNotFound(_))));
        }

        #[tokio::test]
        async fn test_model_without_prefix_is_rejected() {
            let router = ModelRouter::new().with_provider(Arc::new(MockProvider::new("mock")));
            assert!(router.resolve("gpt-4o").is_err());
        }

        #[test]
        fn test_models_are_prefixed() {
            let router = ModelRouter::new().with_provider(Arc::new(MockProvider::new("mock")));
            assert_eq!(router.models(), vec!["mock/test-model".to_string()]);
            assert_eq!(router.provider_names(), vec!["mock".to_string()]);
        }
    }

    // ── Mock provider ──────────────────────────────────────────

    mod mock {
        use super::*;

        #[tokio::test]
        async fn test_multiple_responses_in_order() {
            let provider = MockProvider::new("mock")
                .with_response("first")
                .with_mock_response(MockResponse::tool_calls(vec![
                    ("like", json!({"post_id": "p1"})),
                    ("follow", json!({"target_id": "a2"})),
                ]))
                .with_response("third");
            let req = make_request("test");

            let r1 = provider.complete(&req).await.unwrap();
            let r2 = provider.complete(&req).await.unwrap();
            let r3 = provider.complete(&req).await.unwrap();
            assert_eq!(r1.content, "first");
            let names: Vec<_> = r2.tool_calls.iter().map(|c| c.tool_name.as_str()).collect();
            assert_eq!(names, vec!["like", "follow"]);
            assert_eq!(r3.content, "third");
        }

        #[tokio::test]
        async fn test_records_requests() {
            let provider = MockProvider::new("mock").with_response("ok");
            let mut req = make_request("test");
            req.system = Some("be nice".into());
            let _ = provider.complete(&req).await;
            let recorded = provider.recorded_requests();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].system.as_deref(), Some("be nice"));
        }

        #[tokio::test]
        async fn test_delayed_response_can_time_out() {
            let provider = MockProvider::new("mock").with_mock_response(
                MockResponse::text("late").delayed(std::time::Duration::from_millis(200)),
            );
            let req = make_request("test");
            let result =
                tokio::time::timeout(std::time::Duration::from_millis(20), provider.complete(&req))
                    .await;
            assert!(result.is_err());
        }
    }

    // ── OpenAI response parsing ────────────────────────────────

    mod openai {
        use super::*;

        #[test]
        fn test_parse_text_and_usage() {
            let data = json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "hi there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            });
            let resp = parse_response(&data).unwrap();
            assert_eq!(resp.content, "hi there");
            assert_eq!(resp.usage.total_tokens(), 15);
            assert_eq!(resp.stop_reason, StopReason::EndTurn);
        }

        #[test]
        fn test_parse_tool_calls() {
            let data = json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "like", "arguments": "{\"post_id\":\"P1\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            });
            let resp = parse_response(&data).unwrap();
            assert_eq!(resp.stop_reason, StopReason::ToolUse);
            assert_eq!(resp.tool_calls[0].id, "call_1");
            assert_eq!(resp.tool_calls[0].arguments["post_id"], "P1");
        }

        #[test]
        fn test_parse_rejects_missing_choices() {
            let err = parse_response(&json!({"error": "nope"})).unwrap_err();
            assert!(matches!(err, AgoraError::MalformedResponse(_)));
            assert!(err.is_transient());
        }

        #[test]
        fn test_parse_rejects_bad_arguments() {
            let data = json!({
                "choices": [{
                    "message": {
                        "tool_calls": [{
                            "id": "c",
                            "function": {"name": "like", "arguments": "{not json"}
                        }]
                    }
                }]
            });
            assert!(matches!(
                parse_response(&data),
                Err(AgoraError::MalformedResponse(_))
            ));
        }
    }
}
