use crate::harness::{Assertion, ResponseMatch, Scenario};
use ice_core::IntentType;
use std::time::Duration;

#[test]
fn test_session_survives_restart() {
    Scenario::new("session_restart")
        .from_fixture("default")
        .turn_writing("create src/dates.py", "src/dates.py", b"def parse(): pass\n")
        .restart()
        .assert_turn_count(1)
        .assert(Assertion::EditCount(1))
        .assert_active_file(Some("src/dates.py"))
        // The resumed history still undoes.
        .undo(1)
        .assert_file_missing("src/dates.py")
        .run()
        .unwrap();
}

#[test]
fn test_day_old_session_is_not_resumed() {
    Scenario::new("session_expiry")
        .from_fixture("default")
        .turn_writing("create src/dates.py", "src/dates.py", b"def parse(): pass\n")
        .wait(Duration::from_secs(25 * 3600))
        .restart()
        .assert_turn_count(0)
        .assert(Assertion::EditCount(0))
        .assert_active_file(None)
        .run()
        .unwrap();
}

#[test]
fn test_second_request_waits_for_the_first() {
    Scenario::new("turn_in_progress")
        .from_fixture("default")
        .user_says("edit src/utils.py")
        .assert_response(ResponseMatch::Proceed)
        .user_says_expecting_error("explain src/generator.py", "still in progress")
        .host_completes("edited")
        .user_says("explain src/generator.py")
        .assert_intent(IntentType::ExplainCode)
        .run()
        .unwrap();
}

#[test]
fn test_abandoned_turn_is_not_recorded() {
    Scenario::new("abandoned_turn")
        .from_fixture("default")
        .user_says("edit src/utils.py")
        .host_abandons()
        .assert(Assertion::NoPendingTurn)
        .assert_turn_count(0)
        .assert_active_file(None)
        .run()
        .unwrap();
}

#[test]
fn test_failed_turn_keeps_active_file() {
    Scenario::new("failed_turn")
        .from_fixture("default")
        .turn_writing("create src/a.py", "src/a.py", b"A = 1\n")
        .user_says("edit src/utils.py")
        .host_fails("generator unavailable")
        .assert_active_file(Some("src/a.py"))
        .assert(Assertion::LastTurnSummaryContains("generator unavailable".into()))
        .assert_turn_count(2)
        .run()
        .unwrap();
}

#[test]
fn test_turns_carry_clock_time() {
    Scenario::new("clock_time")
        .from_fixture("default")
        .user_says("help")
        .assert(Assertion::SessionTimestamp(1_704_067_200))
        .wait(Duration::from_secs(90))
        .user_says("status")
        .host_completes("status shown")
        .assert(Assertion::SessionTimestamp(1_704_067_290))
        .run()
        .unwrap();
}

#[test]
fn test_unknown_request_is_a_help_turn() {
    Scenario::new("unknown_request")
        .from_fixture("default")
        .user_says("purple monkey dishwasher")
        .assert_response(ResponseMatch::Help)
        .assert(Assertion::ResponseContains("could not understand request: purple monkey dishwasher".into()))
        .assert(Assertion::NoPendingTurn)
        .assert_turn_count(1)
        // The session carries on normally.
        .user_says("find CodeGenerator")
        .assert_intent(IntentType::SearchCode)
        .assert(Assertion::IntentParam {
            key: "query".into(),
            value: "CodeGenerator".into(),
        })
        .host_completes("1 result")
        .assert_turn_count(2)
        .run()
        .unwrap();
}
