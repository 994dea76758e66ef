#[cfg(test)]
mod tests {
    use agora_core::*;
    use chrono::Utc;
    use serde_json::json;

    // ── Scope tests ────────────────────────────────────────────

    #[test]
    fn test_scope_builder_exposes_fields() {
        let now = Utc::now();
        let scope = Scope::new(Trigger::event("chat_message", now), Actor::agent("a1"))
            .with_subject(Subject::new(
                "m1",
                SubjectKind::Message,
                json!({"sender_id": "h1", "text": "hi"}),
            ))
            .with_conversation("c1")
            .with_data_scope("community", json!("rust"));

        assert_eq!(scope.trigger().kind, TriggerKind::Event);
        assert_eq!(scope.trigger().name, "chat_message");
        assert_eq!(scope.actor().id, "a1");
        assert_eq!(scope.actor().kind, ActorKind::Agent);
        assert_eq!(scope.subject().unwrap().sender_id(), Some("h1"));
        assert_eq!(scope.conversation_id(), Some("c1"));
        assert_eq!(scope.data_scope()["community"], json!("rust"));
    }

    #[test]
    fn test_scope_describe() {
        let scope = Scope::new(Trigger::schedule("agent_cycle", Utc::now()), Actor::agent("a1"));
        assert_eq!(scope.describe(), "schedule:agent_cycle for agent a1");

        let scope = scope.with_subject(Subject::new("p9", SubjectKind::Post, json!({})));
        assert!(scope.describe().ends_with("on post p9"));
    }

    #[test]
    fn test_scope_serde_roundtrip() {
        let scope = Scope::new(Trigger::event("mention", Utc::now()), Actor::agent("a2"))
            .with_conversation("c7");
        let json = serde_json::to_string(&scope).unwrap();
        let restored: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.actor(), scope.actor());
        assert_eq!(restored.conversation_id(), Some("c7"));
        assert!(restored.subject().is_none());
    }

    // ── Subject tests ──────────────────────────────────────────

    #[test]
    fn test_subject_kind_parse() {
        assert_eq!(SubjectKind::parse("post"), SubjectKind::Post);
        assert_eq!(SubjectKind::parse("comment"), SubjectKind::Comment);
        assert_eq!(
            SubjectKind::parse("community"),
            SubjectKind::Other("community".into())
        );
        assert!(SubjectKind::Post.is_public());
        assert!(!SubjectKind::Message.is_public());
    }

    #[test]
    fn test_subject_post_id() {
        let post = Subject::new("p1", SubjectKind::Post, json!({}));
        assert_eq!(post.post_id(), Some("p1"));

        let comment = Subject::new("cm1", SubjectKind::Comment, json!({"post_id": "p2"}));
        assert_eq!(comment.post_id(), Some("p2"));

        let msg = Subject::new("m1", SubjectKind::Message, json!({}));
        assert_eq!(msg.post_id(), None);
    }

    #[test]
    fn test_subject_sender_falls_back_to_author() {
        let s = Subject::new("p1", SubjectKind::Post, json!({"author_id": "h3"}));
        assert_eq!(s.sender_id(), Some("h3"));
    }

    // ── Tool tests ─────────────────────────────────────────────

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("like", json!({"post_id": "p1"}));
        let b = ToolCall::new("like", json!({"post_id": "p1"}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }

    #[test]
    fn test_tool_output_constructors() {
        let data = ToolOutput::data(json!({"posts": []}));
        assert!(!data.changed_world);
        assert!(data.target_id.is_none());

        let changed = ToolOutput::changed(json!({"ok": true}), "p1")
            .with_mentions(vec!["a2".into()]);
        assert!(changed.changed_world);
        assert_eq!(changed.target_id.as_deref(), Some("p1"));
        assert_eq!(changed.mentions, vec!["a2".to_string()]);
    }

    #[test]
    fn test_tool_category_display() {
        assert_eq!(ToolCategory::Data.to_string(), "data");
        assert_eq!(ToolCategory::Action.to_string(), "action");
    }

    // ── Message tests ──────────────────────────────────────────

    #[test]
    fn test_text_message_serializes_without_tool_calls() {
        let msg = Message::text(Role::User, "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({ "role": "user", "content": "hello" }));

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.role, Role::User);
        assert!(back.tool_calls.is_empty());
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = AgoraError::ToolCategoryMismatch {
            tool: "get_feed".into(),
            expected: "action".into(),
            actual: "data".into(),
        };
        assert_eq!(err.to_string(), "tool get_feed is a data tool, expected action");

        let err = AgoraError::not_found("post", "p404");
        assert_eq!(err.to_string(), "post not found: p404");
    }

    #[test]
    fn test_error_transience() {
        assert!(AgoraError::LlmTimeout { secs: 30 }.is_transient());
        assert!(AgoraError::MalformedResponse("bad".into()).is_transient());
        assert!(!AgoraError::ToolNotFound("x".into()).is_transient());
    }

    // ── Event bus tests ────────────────────────────────────────

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(WorldEvent::SchedulerPaused);
        match rx.recv().await.unwrap() {
            WorldEvent::SchedulerPaused => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_bus_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(WorldEvent::Shutdown);
        assert_eq!(bus.subscriber_count(), 0);
    }

    // ── Workflow key tests ─────────────────────────────────────

    #[test]
    fn test_workflow_key_names_round_trip() {
        for key in WorkflowKey::ALL {
            assert_eq!(WorkflowKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(WorkflowKey::parse("nightly_backup"), None);
        assert_eq!(WorkflowKey::AgentCycle.to_string(), "agent_cycle");
    }

    #[test]
    fn test_only_chat_is_event_driven() {
        let event_driven: Vec<_> = WorkflowKey::ALL
            .into_iter()
            .filter(|k| k.is_event_driven())
            .collect();
        assert_eq!(event_driven, vec![WorkflowKey::AgentChat]);
    }

    // ── Clock tests ────────────────────────────────────────────

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance_minutes(90);
        assert_eq!((clock.now() - start).num_minutes(), 90);
    }
}
