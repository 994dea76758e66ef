#[cfg(test)]
mod tests {
    use agora_autonomy::*;
    use agora_config::schema::HeatConfig;
    use agora_core::ManualClock;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn limiter() -> (HeatLimiter, Arc<InMemoryHeatStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryHeatStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = HeatLimiter::new(store.clone(), clock.clone(), HeatConfig::default());
        (limiter, store, clock)
    }

    fn seed(store: &InMemoryHeatStore, clock: &ManualClock, actor: &str, heat: f64) {
        store
            .save_heat(&HeatRecord {
                actor_id: actor.into(),
                current_heat: heat,
                last_decay_at: agora_core::Clock::now(clock),
            })
            .unwrap();
    }

    // ── Heat ───────────────────────────────────────────────────

    mod heat {
        use super::*;

        #[test]
        fn test_fresh_actor_is_cold() {
            let (limiter, _, _) = limiter();
            let status = limiter.check_heat("a1").unwrap();
            assert!(status.allowed);
            assert_eq!(status.current_heat, 0);
            assert_eq!(status.cooldown_minutes, 0);
        }

        #[test]
        fn test_apply_heat_adds_action_cost() {
            let (limiter, store, _) = limiter();
            let record = limiter.apply_heat("a1", "like", Some("p1")).unwrap();
            assert_eq!(record.current_heat, 10.0);
            assert_eq!(limiter.check_heat("a1").unwrap().current_heat, 10);
            assert_eq!(store.events(), vec![("a1".into(), "like".into(), 10)]);
        }

        #[test]
        fn test_hot_actor_blocked_from_like() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "a1", 95.0);

            let status = limiter.check_action("a1", "like").unwrap();
            assert!(!status.allowed);
            assert_eq!(status.current_heat, 95);
            assert!(status.cooldown_minutes > 0);
            // Checking never writes.
            assert_eq!(store.load_heat("a1").unwrap().unwrap().current_heat, 95.0);
            assert!(store.events().is_empty());
        }

        #[test]
        fn test_cost_must_fit_under_max() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "a1", 79.0);
            // Under the threshold, but 79 + 25 > 100.
            assert!(limiter.check_heat("a1").unwrap().allowed);
            let status = limiter.check_action("a1", "create_post").unwrap();
            assert!(!status.allowed);
            assert_eq!(status.cooldown_minutes, 4);
            assert!(limiter.check_action("a1", "reply").unwrap().allowed);
        }

        #[test]
        fn test_cooldown_matches_decay() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "a1", 90.0);
            let status = limiter.check_heat("a1").unwrap();
            assert!(!status.allowed);
            assert_eq!(status.cooldown_minutes, 11);

            clock.advance_minutes(status.cooldown_minutes as i64);
            assert!(limiter.check_heat("a1").unwrap().allowed);
        }

        #[test]
        fn test_decay_is_monotonic_and_floors_at_zero() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "a1", 50.0);
            let mut last = limiter.current_heat("a1").unwrap();
            for _ in 0..80 {
                clock.advance_minutes(1);
                let now = limiter.current_heat("a1").unwrap();
                assert!(now <= last);
                assert!(now >= 0.0);
                last = now;
            }
            assert_eq!(last, 0.0);
        }

        #[test]
        fn test_heat_stays_in_bounds_under_any_sequence() {
            let (limiter, _, clock) = limiter();
            let kinds = ["like", "comment", "create_post", "follow", "reply"];
            for i in 0..200u32 {
                let kind = kinds[(i as usize * 7) % kinds.len()];
                limiter.apply_heat("a1", kind, None).unwrap();
                let heat = limiter.current_heat("a1").unwrap();
                assert!((0.0..=100.0).contains(&heat), "heat {heat} out of bounds");
                if i % 3 == 0 {
                    clock.advance_minutes((i % 11) as i64);
                }
                let status = limiter.check_heat("a1").unwrap();
                assert!(status.current_heat <= 100);
            }
        }

        #[test]
        fn test_actors_are_independent() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "hot", 99.0);
            assert!(!limiter.check_heat("hot").unwrap().allowed);
            assert!(limiter.check_heat("cold").unwrap().allowed);
        }

        #[test]
        fn test_apply_decays_before_adding() {
            let (limiter, store, clock) = limiter();
            seed(&store, &clock, "a1", 30.0);
            clock.advance_minutes(20);
            let record = limiter.apply_heat("a1", "like", None).unwrap();
            assert_eq!(record.current_heat, 20.0);
            assert_eq!(record.last_decay_at, agora_core::Clock::now(clock.as_ref()));
        }
    }

    // ── Escalation ─────────────────────────────────────────────

    mod escalation {
        use super::*;

        fn tracker() -> (
            EscalationTracker,
            Arc<InMemoryInteractionHistory>,
            Arc<ManualClock>,
        ) {
            let history = Arc::new(InMemoryInteractionHistory::new());
            let clock = Arc::new(ManualClock::new(Utc::now()));
            (
                EscalationTracker::new(history.clone(), clock.clone()),
                history,
                clock,
            )
        }

        fn decline(history: &InMemoryInteractionHistory, at: chrono::DateTime<Utc>) {
            history
                .record_refusal(&RefusalEvent {
                    actor_id: "a1".into(),
                    requester_id: "h1".into(),
                    kind: RefusalKind::Decline,
                    level: EscalationLevel::Polite,
                    request_kind: Some("money".into()),
                    at,
                })
                .unwrap();
        }

        #[test]
        fn test_level_mapping() {
            assert_eq!(EscalationLevel::from_persistence(0), EscalationLevel::Polite);
            assert_eq!(EscalationLevel::from_persistence(1), EscalationLevel::Firm);
            assert_eq!(EscalationLevel::from_persistence(2), EscalationLevel::Harsh);
            assert_eq!(EscalationLevel::from_persistence(7), EscalationLevel::Ignore);
            assert_eq!(
                EscalationLevel::from_decline_level(3),
                Some(EscalationLevel::Harsh)
            );
            assert_eq!(EscalationLevel::from_decline_level(4), None);
        }

        #[test]
        fn test_no_prior_declines_is_polite() {
            let (tracker, _, _) = tracker();
            let report = tracker
                .count_similar_requests("a1", "h1", Some("money"), 24)
                .unwrap();
            assert_eq!(report.persistence_level, 0);
            assert_eq!(report.level, EscalationLevel::Polite);
        }

        #[test]
        fn test_two_declines_is_harsh_or_worse() {
            let (tracker, history, clock) = tracker();
            let now = agora_core::Clock::now(clock.as_ref());
            decline(&history, now - Duration::hours(1));
            decline(&history, now - Duration::hours(2));
            let report = tracker.count_similar_requests("a1", "h1", None, 24).unwrap();
            assert_eq!(report.decline_count, 2);
            assert!(report.level >= EscalationLevel::Harsh);
        }

        #[test]
        fn test_decline_outside_window_does_not_count() {
            let (tracker, history, clock) = tracker();
            let now = agora_core::Clock::now(clock.as_ref());
            decline(&history, now - Duration::hours(24) - Duration::seconds(1));
            // Lower bound is inclusive.
            decline(&history, now - Duration::hours(24));
            // "now" itself is excluded.
            decline(&history, now);
            let report = tracker.count_similar_requests("a1", "h1", None, 24).unwrap();
            assert_eq!(report.persistence_level, 1);
            assert_eq!(report.level, EscalationLevel::Firm);
        }

        #[test]
        fn test_ignores_count_toward_persistence_not_declines() {
            let (tracker, history, clock) = tracker();
            let now = agora_core::Clock::now(clock.as_ref());
            history
                .record_refusal(&RefusalEvent {
                    actor_id: "a1".into(),
                    requester_id: "h1".into(),
                    kind: RefusalKind::Ignore,
                    level: EscalationLevel::Ignore,
                    request_kind: None,
                    at: now - Duration::minutes(5),
                })
                .unwrap();
            let report = tracker.count_similar_requests("a1", "h1", None, 24).unwrap();
            assert_eq!(report.decline_count, 0);
            assert_eq!(report.persistence_level, 1);
        }

        #[test]
        fn test_similar_requests_match_kind_case_insensitively() {
            let (tracker, history, clock) = tracker();
            let now = agora_core::Clock::now(clock.as_ref());
            for (text, mins) in [("Send me MONEY", 10), ("hello", 20), ("more money pls", 30)] {
                history.push_message(InboundMessage {
                    sender_id: "h1".into(),
                    recipient_id: "a1".into(),
                    text: text.into(),
                    at: now - Duration::minutes(mins),
                });
            }
            let report = tracker
                .count_similar_requests("a1", "h1", Some("money"), 1)
                .unwrap();
            assert_eq!(report.total_recent_messages, 3);
            assert_eq!(report.similar_requests_count, 2);
        }

        #[test]
        fn test_other_requesters_are_separate() {
            let (tracker, history, clock) = tracker();
            decline(&history, agora_core::Clock::now(clock.as_ref()) - Duration::hours(1));
            let report = tracker.count_similar_requests("a1", "h2", None, 24).unwrap();
            assert_eq!(report.persistence_level, 0);
        }
    }

    // ── Token budget ───────────────────────────────────────────

    mod budget {
        use super::*;

        #[test]
        fn test_record_and_exceed() {
            let budget = TokenBudget::new(1000, Arc::new(ManualClock::new(Utc::now())));
            assert!(budget.record(600).is_ok());
            assert!(budget.has_remaining());
            assert!(budget.record(600).is_err());
            assert!(!budget.has_remaining());
            assert!(budget.check().is_err());
            assert_eq!(budget.snapshot().daily_tokens, 1200);
        }

        #[test]
        fn test_reset() {
            let budget = TokenBudget::new(100, Arc::new(ManualClock::new(Utc::now())));
            let _ = budget.record(500);
            budget.reset();
            assert!(budget.has_remaining());
            assert_eq!(budget.snapshot().daily_tokens, 0);
            assert_eq!(budget.snapshot().total_tokens, 500);
        }

        #[test]
        fn test_day_rollover_resets() {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let budget = TokenBudget::new(100, clock.clone());
            let _ = budget.record(500);
            assert!(!budget.has_remaining());
            clock.advance(Duration::days(1));
            assert!(budget.has_remaining());
        }

        #[test]
        fn test_zero_limit_is_unlimited() {
            let budget = TokenBudget::new(0, Arc::new(ManualClock::new(Utc::now())));
            assert!(budget.record(u32::MAX as u64).is_ok());
            assert!(budget.has_remaining());
        }
    }
}
