#[cfg(test)]
mod tests {
    use agora_autonomy::{EscalationLevel, HeatRecord, HeatStore};
    use agora_config::AgoraConfig;
    use agora_config::schema::JobConfig;
    use agora_core::{
        Actor, AgoraError, Clock, ManualClock, Scope, Subject, SubjectKind, ToolCategory,
        ToolOutput, Trigger, WorkflowKey,
    };
    use agora_llm::{MockProvider, MockResponse};
    use agora_runtime::*;
    use agora_store::{ActorProfile, RunStatus, SqliteStore};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        rt: AgoraRuntime,
        clock: Arc<ManualClock>,
        llm: Arc<MockProvider>,
        sink: Arc<MemoryTraceSink>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn test_config() -> AgoraConfig {
        let mut config = AgoraConfig::default();
        config.engine.llm_retries = 0;
        config.scheduler.jobs.clear();
        config.scheduler.cron_secret = Some("s3cret".into());
        config
    }

    fn harness(llm: MockProvider) -> Harness {
        harness_with(test_config(), llm, vec![])
    }

    fn harness_with(config: AgoraConfig, llm: MockProvider, tools: Vec<ToolDefinition>) -> Harness {
        let clock = Arc::new(ManualClock::new(start()));
        let store = SqliteStore::open_in_memory_with_clock(clock.clone()).unwrap();
        store
            .upsert_actor(&ActorProfile::agent("a", "ava", "curious and kind"))
            .unwrap();
        store
            .upsert_actor(&ActorProfile::agent("c", "cy", "dry humour"))
            .unwrap();
        store.upsert_actor(&ActorProfile::human("b", "bo")).unwrap();

        let llm = Arc::new(llm);
        let sink = Arc::new(MemoryTraceSink::new());
        let mut builder = AgoraRuntime::builder(config)
            .store(store)
            .llm(llm.clone())
            .clock(clock.clone())
            .trace_sink(sink.clone());
        for tool in tools {
            builder = builder.tool(tool);
        }
        Harness {
            rt: builder.build().unwrap(),
            clock,
            llm,
            sink,
        }
    }

    fn post_by_b(h: &Harness) -> String {
        h.rt.store
            .create_post("b", "Sunny day at the lake", None)
            .unwrap()
            .id
    }

    fn scheduled(actor: &str) -> Scope {
        Scope::new(
            Trigger::schedule(WorkflowKey::AgentCycle.as_str(), start()),
            Actor::agent(actor),
        )
    }

    fn poke_tool() -> ToolDefinition {
        ToolDefinition::new(
            "poke",
            ToolCategory::Action,
            "Nudge the world",
            json!({ "type": "object", "properties": {} }),
            |_input: Value, _ctx: ToolContext| async move {
                Ok::<_, AgoraError>(ToolOutput::changed(json!({ "poked": true }), "world"))
            },
        )
    }

    fn failing_tool() -> ToolDefinition {
        ToolDefinition::new(
            "explode",
            ToolCategory::Action,
            "Always fails",
            json!({ "type": "object", "properties": {} }),
            |_input: Value, _ctx: ToolContext| async move {
                Err::<ToolOutput, _>(AgoraError::ToolExecution {
                    tool: "explode".into(),
                    reason: "fuse blown".into(),
                })
            },
        )
    }

    fn panicking_tool() -> ToolDefinition {
        ToolDefinition::new(
            "meltdown",
            ToolCategory::Action,
            "Always panics",
            json!({ "type": "object", "properties": {} }),
            |input: Value, _ctx: ToolContext| async move {
                if input.is_object() {
                    panic!("kaboom");
                }
                Ok::<_, AgoraError>(ToolOutput::data(json!({})))
            },
        )
    }

    // ── Engine ─────────────────────────────────────────────────

    mod engine {
        use super::*;

        #[tokio::test]
        async fn test_like_heats_actor_and_loops_once_more() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            h.llm
                .queue_response(MockResponse::tool_calls(vec![("like", json!({ "post_id": post }))]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["like"]);
            assert_eq!(state.iteration(), 2);
            assert!(state.errors.is_empty(), "{:?}", state.errors);
            assert!(state.halted.is_none());
            assert_eq!(state.step, Step::Done);
            assert_eq!(h.rt.engine.heat().current_heat("a").unwrap(), 10.0);
            assert_eq!(h.rt.store.require_post(&post).unwrap().like_count, 1);
            assert_eq!(h.llm.call_count(), 2);
        }

        #[tokio::test]
        async fn test_hot_actor_is_blocked_without_error() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            h.rt.store
                .save_heat(&HeatRecord {
                    actor_id: "a".into(),
                    current_heat: 95.0,
                    last_decay_at: h.clock.now(),
                })
                .unwrap();
            h.llm
                .queue_response(MockResponse::tool_calls(vec![("like", json!({ "post_id": post }))]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert!(state.executed_actions.is_empty());
            assert!(state.errors.is_empty(), "{:?}", state.errors);
            assert_eq!(state.heat_blocked().count(), 1);
            assert_eq!(state.iteration(), 1);
            assert_eq!(h.rt.engine.heat().current_heat("a").unwrap(), 95.0);
            assert_eq!(h.rt.store.require_post(&post).unwrap().like_count, 0);

            // Throttled tools are not even offered while hot.
            let offered: Vec<String> = h.llm.recorded_requests()[0]
                .tools
                .iter()
                .map(|t| t.name.clone())
                .collect();
            assert!(!offered.contains(&"like".to_string()));
            assert!(offered.contains(&"remember".to_string()));
        }

        #[tokio::test]
        async fn test_iterations_stop_at_the_cap() {
            let mut config = test_config();
            config.engine.max_iterations = 3;
            let llm = MockProvider::new("mock")
                .with_fallback(MockResponse::tool_calls(vec![("poke", json!({}))]));
            let h = harness_with(config, llm, vec![poke_tool()]);

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.iteration(), 3);
            assert_eq!(state.executed_actions.len(), 3);
            assert_eq!(h.llm.call_count(), 3);
            assert!(state.halted.is_none());
        }

        #[tokio::test]
        async fn test_failed_call_does_not_stop_the_rest() {
            let llm = MockProvider::new("mock").with_mock_response(MockResponse::tool_calls(vec![
                ("poke", json!({})),
                ("explode", json!({})),
                ("remember", json!({ "content": "bo likes lakes" })),
            ]));
            let h = harness_with(test_config(), llm, vec![poke_tool(), failing_tool()]);

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["poke", "remember"]);
            assert_eq!(state.errors.len(), 1);
            assert!(state.errors[0].contains("fuse blown"));
            assert!(matches!(
                state.outcomes[1].outcome,
                ActionOutcome::Failed { .. }
            ));
            assert!(state.halted.is_none());
            assert_eq!(h.rt.store.memories_of("a", 10).unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_unknown_and_data_tools_are_rejected_in_act() {
            let h = harness(MockProvider::new("mock").with_mock_response(
                MockResponse::tool_calls(vec![
                    ("get_feed", json!({})),
                    ("teleport", json!({})),
                    ("like", json!({})),
                ]),
            ));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert!(state.executed_actions.is_empty());
            assert_eq!(state.errors.len(), 3);
            assert!(
                state
                    .outcomes
                    .iter()
                    .all(|r| matches!(r.outcome, ActionOutcome::Invalid { .. }))
            );
            assert!(state.errors[2].contains("post_id"));
            assert_eq!(state.iteration(), 1);
        }

        #[tokio::test]
        async fn test_model_failure_halts_cycle() {
            let h = harness(MockProvider::new("mock").with_error("upstream exploded"));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert!(state.halted.as_deref().unwrap().starts_with("reason:"));
            assert_eq!(state.errors.len(), 1);
            assert!(state.executed_actions.is_empty());
            assert_eq!(state.step, Step::Done);
        }

        #[tokio::test]
        async fn test_transient_model_error_is_retried() {
            let mut config = test_config();
            config.engine.llm_retries = 1;
            let h = harness_with(config, MockProvider::new("mock"), vec![]);
            let post = post_by_b(&h);
            h.llm.queue_response(MockResponse::error("503"));
            h.llm
                .queue_response(MockResponse::tool_calls(vec![("like", json!({ "post_id": post }))]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["like"]);
            assert!(state.errors.is_empty(), "{:?}", state.errors);
            assert_eq!(h.llm.call_count(), 3);
        }

        #[tokio::test]
        async fn test_model_call_is_retried_at_most_once() {
            let mut config = test_config();
            config.engine.llm_retries = 3;
            let llm = MockProvider::new("mock").with_fallback(MockResponse::error("503"));
            let h = harness_with(config, llm, vec![]);

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert!(state.halted.as_deref().unwrap().starts_with("reason:"));
            assert_eq!(h.llm.call_count(), 2);
        }

        #[tokio::test]
        async fn test_deleted_subject_is_not_found_and_siblings_run() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            assert!(h.rt.store.delete_post(&post).unwrap());
            h.llm.queue_response(MockResponse::tool_calls(vec![
                ("comment", json!({ "post_id": post, "content": "Lovely!" })),
                ("remember", json!({ "content": "bo posted about the lake" })),
            ]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["remember"]);
            assert_eq!(state.errors.len(), 1);
            assert!(state.errors[0].contains("not found"), "{:?}", state.errors);
            assert!(state.halted.is_none());
            assert!(h.rt.store.comments_on(&post).unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_send_message_twice_reuses_conversation() {
            let h = harness(MockProvider::new("mock"));
            h.llm.queue_response(MockResponse::tool_calls(vec![
                ("send_message", json!({ "recipient_id": "b", "content": "hi bo" })),
                ("send_message", json!({ "recipient_id": "b", "content": "still there?" })),
            ]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["send_message", "send_message"]);
            assert_eq!(h.rt.store.conversation_count().unwrap(), 1);
            let (conversation, created) =
                h.rt.store.find_or_create_conversation("b", "a").unwrap();
            assert!(!created);
            assert_eq!(
                h.rt.store.recent_messages(&conversation.id, 10).unwrap().len(),
                2
            );
        }

        #[tokio::test]
        async fn test_panicking_read_leaves_observation_partial() {
            let broken_feed = ToolDefinition::new(
                "get_feed",
                ToolCategory::Data,
                "Always panics",
                json!({ "type": "object", "properties": {} }),
                |input: Value, _ctx: ToolContext| async move {
                    if input.is_object() {
                        panic!("feed on fire");
                    }
                    Ok::<_, AgoraError>(ToolOutput::data(json!({})))
                },
            );
            let h = harness_with(test_config(), MockProvider::new("mock"), vec![broken_feed]);

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert!(state.halted.is_none());
            assert_eq!(state.errors.len(), 1);
            assert!(state.errors[0].starts_with("observe:"));
            assert!(state.errors[0].contains("feed on fire"));
            assert!(state.observation.contains_key("get_profile"));
            assert!(!state.observation.contains_key("get_feed"));
            assert_eq!(h.llm.call_count(), 1);
        }

        #[tokio::test]
        async fn test_handler_panic_halts_and_keeps_partial_state() {
            let llm = MockProvider::new("mock").with_mock_response(MockResponse::tool_calls(vec![
                ("poke", json!({})),
                ("meltdown", json!({})),
                ("poke", json!({})),
            ]));
            let h = harness_with(test_config(), llm, vec![poke_tool(), panicking_tool()]);

            let state = h.rt.engine.run_cycle(scheduled("a")).await;

            assert_eq!(state.executed_actions, vec!["poke"]);
            assert!(state.halted.as_deref().unwrap().contains("kaboom"));
            assert_eq!(state.outcomes.len(), 2);
            assert_eq!(state.step, Step::Done);
            assert_eq!(h.llm.call_count(), 1);
        }

        #[tokio::test]
        async fn test_reply_only_offered_with_a_conversation() {
            let h = harness(MockProvider::new("mock"));
            h.rt.engine.run_cycle(scheduled("a")).await;
            h.rt.triggers
                .receive_message("b", "a", "hello there")
                .await
                .unwrap();

            let requests = h.llm.recorded_requests();
            let offers_reply = |i: usize| requests[i].tools.iter().any(|t| t.name == "reply");
            assert!(!offers_reply(0));
            assert!(offers_reply(1));
        }

        #[tokio::test]
        async fn test_mention_starts_a_detached_cycle() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            h.llm.queue_response(MockResponse::tool_calls(vec![(
                "comment",
                json!({ "post_id": post, "content": "@cy you would love this" }),
            )]));

            let state = h.rt.engine.run_cycle(scheduled("a")).await;
            assert_eq!(state.executed_actions, vec!["comment"]);
            assert!(h.rt.drain(Duration::from_secs(5)).await);

            // a: comment + quiet second iteration, c: one mention cycle.
            assert_eq!(h.llm.call_count(), 3);
            let notes = h.rt.store.notifications_for("c", 10).unwrap();
            assert!(notes.iter().any(|n| n.kind == "mention" && n.actor_id == "a"));
            assert_eq!(h.rt.supervisor.in_flight(), 0);
        }
    }

    // ── Tracing ────────────────────────────────────────────────

    mod tracing_tree {
        use super::*;

        fn root_of(runs: &[TraceRun], run: &TraceRun) -> agora_core::RunId {
            let mut current = run.clone();
            while let Some(parent) = current.parent_id {
                current = runs.iter().find(|r| r.id == parent).unwrap().clone();
            }
            current.id
        }

        #[tokio::test]
        async fn test_concurrent_cycles_build_separate_trees() {
            let h = harness(MockProvider::new("mock"));

            let engine = h.rt.engine.clone();
            let (sa, sc) = tokio::join!(
                engine.run_cycle(scheduled("a")),
                engine.run_cycle(scheduled("c"))
            );
            assert!(sa.succeeded() && sc.succeeded());

            let runs = h.sink.runs();
            assert!(h.sink.open_runs().is_empty());
            let roots: Vec<&TraceRun> = runs.iter().filter(|r| r.parent_id.is_none()).collect();
            assert_eq!(roots.len(), 2);
            assert!(roots.iter().all(|r| r.kind == RunKind::Workflow));

            for root in roots {
                let actor = root.inputs.pointer("/actor/id").unwrap().clone();
                let tree: Vec<&TraceRun> = runs
                    .iter()
                    .filter(|r| r.id != root.id && root_of(&runs, r) == root.id)
                    .collect();
                let nodes = |name: &str| tree.iter().filter(|r| r.name == name).count();
                assert_eq!(nodes("observe"), 1);
                assert_eq!(nodes("reason"), 1);
                assert_eq!(nodes("loop"), 1);

                let profile = tree.iter().find(|r| r.name == "get_profile").unwrap();
                assert_eq!(
                    profile.outputs.as_ref().unwrap().pointer("/content/profile/id"),
                    Some(&actor)
                );
            }
        }

        #[tokio::test]
        async fn test_tool_runs_hang_under_act() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            h.llm
                .queue_response(MockResponse::tool_calls(vec![("like", json!({ "post_id": post }))]));

            h.rt.engine.run_cycle(scheduled("a")).await;

            let runs = h.sink.runs();
            let like = runs.iter().find(|r| r.name == "like").unwrap();
            assert_eq!(like.kind, RunKind::ToolCall);
            let parent = runs.iter().find(|r| Some(r.id) == like.parent_id).unwrap();
            assert_eq!(parent.name, "act");
            assert_eq!(runs.iter().filter(|r| r.name == "observe").count(), 2);
        }
    }

    // ── Refusals ───────────────────────────────────────────────

    mod refusal {
        use super::*;

        #[tokio::test]
        async fn test_decline_on_a_post_answers_with_a_comment() {
            let h = harness(MockProvider::new("mock"));
            let post = post_by_b(&h);
            h.llm.queue_response(MockResponse::tool_calls(vec![(
                "decline",
                json!({ "level": 1, "message": "Not today, thanks." }),
            )]));
            let scope = Scope::new(Trigger::event("mention", start()), Actor::agent("a"))
                .with_subject(Subject::new(
                    post.clone(),
                    SubjectKind::Post,
                    json!({ "author_id": "b", "post_id": post }),
                ));

            let state = h.rt.engine.run_cycle(scope).await;

            assert_eq!(state.executed_actions, vec!["decline"]);
            assert!(state.observation.contains_key("count_similar_requests"));
            let comments = h.rt.store.comments_on(&post).unwrap();
            assert_eq!(comments.len(), 1);
            assert_eq!(comments[0].author_id, "a");
            assert_eq!(h.rt.store.conversation_count().unwrap(), 0);
        }

        #[tokio::test]
        async fn test_decline_in_private_answers_in_the_conversation() {
            let h = harness(MockProvider::new("mock"));
            h.llm.queue_response(MockResponse::tool_calls(vec![(
                "decline",
                json!({ "level": 2, "message": "No." }),
            )]));

            let resp = h.rt.triggers
                .receive_message("b", "a", "lend me your keys")
                .await
                .unwrap();

            assert!(resp.success);
            assert_eq!(resp.executed_actions, vec!["decline"]);
            let conversation = h.rt.store.find_conversation("a", "b").unwrap().unwrap();
            let messages = h.rt.store.recent_messages(&conversation.id, 10).unwrap();
            assert_eq!(messages.len(), 2);
            assert!(messages.iter().any(|m| m.sender_id == "a" && m.content == "No."));
        }

        #[tokio::test]
        async fn test_repeated_requests_escalate() {
            let h = harness(MockProvider::new("mock"));
            h.llm.queue_response(MockResponse::tool_calls(vec![(
                "decline",
                json!({ "level": 1, "message": "I'd rather not." }),
            )]));
            h.rt.triggers
                .receive_message("b", "a", "give me your password")
                .await
                .unwrap();
            h.clock.advance_minutes(1);

            let report = h
                .rt
                .engine
                .escalation()
                .count_similar_requests("a", "b", Some("password"), 24)
                .unwrap();
            assert_eq!(report.similar_requests_count, 1);
            assert_eq!(report.decline_count, 1);
            assert_eq!(report.level, EscalationLevel::Firm);

            h.rt.triggers
                .receive_message("b", "a", "seriously, the password")
                .await
                .unwrap();
            let requests = h.llm.recorded_requests();
            let system = requests[2].system.as_deref().unwrap();
            assert!(system.contains(EscalationLevel::Firm.guidance()));
        }

        #[tokio::test]
        async fn test_reply_uses_the_bound_conversation() {
            let h = harness(MockProvider::new("mock"));
            h.llm.queue_response(MockResponse::tool_calls(vec![(
                "reply",
                json!({ "content": "Hey bo!" }),
            )]));

            let resp = h.rt.triggers.receive_message("b", "a", "hi ava").await.unwrap();

            assert_eq!(resp.executed_actions, vec!["reply"]);
            assert_eq!(h.rt.store.conversation_count().unwrap(), 1);
            let conversation = h.rt.store.find_conversation("b", "a").unwrap().unwrap();
            let messages = h.rt.store.recent_messages(&conversation.id, 10).unwrap();
            assert!(messages.iter().any(|m| m.sender_id == "a" && m.content == "Hey bo!"));
        }
    }

    // ── Scheduler ──────────────────────────────────────────────

    mod scheduler {
        use super::*;

        #[tokio::test]
        async fn test_overlapping_run_is_skipped() {
            let llm = MockProvider::new("mock")
                .with_fallback(MockResponse::text("thinking").delayed(Duration::from_millis(300)));
            let h = harness(llm);

            let scheduler = h.rt.scheduler.clone();
            let first = tokio::spawn(async move {
                scheduler
                    .run_workflow(WorkflowKey::AgentCycle, RunContext::manual())
                    .await
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
            let second = h
                .rt
                .scheduler
                .run_workflow(WorkflowKey::AgentCycle, RunContext::manual())
                .await;
            let first = first.await.unwrap();

            assert_eq!(second.status, RunStatus::Skipped);
            assert_eq!(second.message, "already running");
            assert_eq!(first.status, RunStatus::Success);
            assert_eq!(first.cycles.len(), 2);
            assert_eq!(h.rt.store.recent_runs(10).unwrap().len(), 2);

            let job = h
                .rt
                .scheduler
                .job_states()
                .into_iter()
                .find(|j| j.key == "agent_cycle")
                .unwrap();
            assert_eq!(job.state, JobState::Idle);
            assert_eq!(job.last_status, Some(RunStatus::Success));
        }

        #[tokio::test]
        async fn test_paused_scheduler_skips_agent_cycle() {
            let h = harness(MockProvider::new("mock"));
            h.rt.scheduler.pause().unwrap();
            assert!(h.rt.scheduler.is_paused().unwrap());

            let result = h
                .rt
                .scheduler
                .run_workflow(WorkflowKey::AgentCycle, RunContext::manual())
                .await;
            assert_eq!(result.status, RunStatus::Skipped);
            assert_eq!(h.llm.call_count(), 0);

            h.rt.scheduler.resume().unwrap();
            let result = h
                .rt
                .scheduler
                .run_workflow(WorkflowKey::AgentCycle, RunContext::manual())
                .await;
            assert!(result.is_success());
        }

        #[tokio::test]
        async fn test_spent_budget_skips_until_reset() {
            let mut config = test_config();
            config.budget.daily_token_limit = 100;
            let h = harness_with(config, MockProvider::new("mock"), vec![]);
            let _ = h.rt.engine.budget().record(150);

            let result = h
                .rt
                .scheduler
                .run_workflow(WorkflowKey::AgentCycle, RunContext::manual())
                .await;
            assert_eq!(result.status, RunStatus::Skipped);
            assert_eq!(h.llm.call_count(), 0);

            let reset = h
                .rt
                .scheduler
                .run_workflow(WorkflowKey::TokenBudgetReset, RunContext::manual())
                .await;
            assert!(reset.is_success());
            assert_eq!(reset.data["spent_before_reset"], 150);
            assert!(h.rt.engine.budget().has_remaining());
        }

        #[tokio::test]
        async fn test_tick_fires_due_jobs() {
            let mut config = test_config();
            config.scheduler.jobs = vec![JobConfig::every("relationship_decay", 60)];
            let h = harness_with(config, MockProvider::new("mock"), vec![]);

            assert!(h.rt.scheduler.tick().is_empty());
            h.clock.advance_minutes(2);
            assert_eq!(h.rt.scheduler.tick(), vec![WorkflowKey::RelationshipDecay]);
            assert!(h.rt.drain(Duration::from_secs(5)).await);

            let runs = h.rt.store.recent_runs(5).unwrap();
            assert_eq!(runs.len(), 1);
            assert_eq!(runs[0].workflow_key, "relationship_decay");
            assert_eq!(runs[0].trigger, "timer");
            assert_eq!(runs[0].status, RunStatus::Success);
            // Not due again until another interval passes.
            assert!(h.rt.scheduler.tick().is_empty());
        }

        #[tokio::test]
        async fn test_unknown_workflow_name() {
            let h = harness(MockProvider::new("mock"));
            let err = h
                .rt
                .scheduler
                .run_named("agent_dance", RunContext::manual())
                .await
                .unwrap_err();
            assert!(matches!(err, AgoraError::UnknownWorkflow(_)));
        }
    }

    // ── Triggers ───────────────────────────────────────────────

    mod triggers {
        use super::*;

        #[tokio::test]
        async fn test_scheduled_trigger_requires_the_secret() {
            let h = harness(MockProvider::new("mock"));
            let t = &h.rt.triggers;

            assert!(matches!(
                t.run_scheduled("memory_cleanup", None).await,
                Err(AgoraError::Unauthorized(_))
            ));
            assert!(matches!(
                t.run_scheduled("memory_cleanup", Some("nope")).await,
                Err(AgoraError::Unauthorized(_))
            ));
            let resp = t
                .run_scheduled("memory_cleanup", Some("s3cret"))
                .await
                .unwrap();
            assert!(resp.success);
            assert_eq!(resp.status, RunStatus::Success);

            assert!(matches!(
                t.run_scheduled("agent_chat", Some("s3cret")).await,
                Err(AgoraError::UnknownWorkflow(_))
            ));
        }

        #[tokio::test]
        async fn test_unconfigured_secret_disables_trigger() {
            let h = harness(MockProvider::new("mock"));
            let t = Triggers::new(h.rt.scheduler.clone(), Some(""));
            assert!(matches!(
                t.check_secret(Some("")),
                Err(AgoraError::Unauthorized(_))
            ));
        }

        #[tokio::test]
        async fn test_chat_needs_an_agent() {
            let h = harness(MockProvider::new("mock"));
            let subject = Subject::new("m1", SubjectKind::Message, json!({ "sender_id": "a" }));
            let err = h.rt.triggers.run_chat("b", subject, None).await.unwrap_err();
            assert!(matches!(err, AgoraError::NotFound { .. }));
        }

        #[tokio::test]
        async fn test_receive_message_reuses_the_conversation() {
            let h = harness(MockProvider::new("mock"));
            h.rt.triggers.receive_message("b", "a", "hi").await.unwrap();
            h.rt.triggers.receive_message("b", "a", "you there?").await.unwrap();

            assert_eq!(h.rt.store.conversation_count().unwrap(), 1);
            let runs = h.rt.store.runs_for("agent_chat", 10).unwrap();
            assert_eq!(runs.len(), 2);
            assert!(runs.iter().all(|r| r.trigger == "chat"));
        }
    }

    // ── Registry ───────────────────────────────────────────────

    mod registry {
        use super::*;

        #[tokio::test]
        async fn test_builtins_registered_by_category() {
            let h = harness(MockProvider::new("mock"));
            let registry = h.rt.engine.registry();

            assert!(registry.validate().is_ok());
            assert_eq!(registry.len(), BuiltinTool::ALL.len());
            assert_eq!(registry.by_category(ToolCategory::Data).len(), 6);
            assert!(registry.resolve_in("like", ToolCategory::Action).is_ok());
            assert!(matches!(
                registry.resolve_in("get_feed", ToolCategory::Action),
                Err(AgoraError::ToolCategoryMismatch { .. })
            ));
        }

        #[test]
        fn test_builtin_name_with_wrong_category_fails_validation() {
            let mut registry = ToolRegistry::new();
            registry.register(ToolDefinition::new(
                "get_feed",
                ToolCategory::Action,
                "not really a feed",
                json!({ "type": "object", "properties": {} }),
                |_input: Value, _ctx: ToolContext| async move {
                    Ok::<_, AgoraError>(ToolOutput::data(json!({})))
                },
            ));
            assert!(matches!(
                registry.validate(),
                Err(AgoraError::InvalidToolSchema { .. })
            ));
        }
    }
}
