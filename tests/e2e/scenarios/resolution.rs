use crate::harness::{Assertion, Reply, ResponseMatch, Scenario};
use ice_core::{IntentSource, IntentType};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_create_python_function_skips_the_model() {
    for topic in ["parsing dates", "X", "the CodeGenerator cache"] {
        Scenario::new("create_python_function")
            .from_fixture("default")
            .user_says(&format!("Create a Python function for {}", topic))
            .assert_response(ResponseMatch::Proceed)
            .assert_intent(IntentType::CreateFile)
            .assert_source(IntentSource::Matcher)
            .assert(Assertion::ConfidenceAtLeast(0.75))
            .assert(Assertion::IntentParam {
                key: "language".into(),
                value: "python".into(),
            })
            .assert_model_calls(0)
            .run()
            .unwrap();
    }
}

#[test]
fn test_pronoun_follows_active_file() {
    Scenario::new("pronoun_follows_active_file")
        .from_fixture("default")
        .turn_writing("create src/dates.py", "src/dates.py", b"print('dates')\n")
        .assert_active_file(Some("src/dates.py"))
        .user_says("run it")
        .assert_response(ResponseMatch::ConfirmDestructive)
        .assert(Assertion::ResponseContains("Run src/dates.py?".into()))
        .assert(Assertion::IntentTarget(Some("src/dates.py".into())))
        .user_confirms()
        .assert_response(ResponseMatch::Proceed)
        .host_completes("ran src/dates.py")
        .assert_turn_count(2)
        .assert_model_calls(0)
        .run()
        .unwrap();
}

#[test]
fn test_unsure_match_is_settled_by_the_model() {
    Scenario::new("model_settles")
        .from_fixture("default")
        .model_answers(json!({
            "intent_type": "create_file",
            "confidence": 0.9,
            "target_path": "src/nice.py",
            "parameters": { "language": "python" }
        }))
        .user_says("create something nice")
        .assert_response(ResponseMatch::Proceed)
        .assert_intent(IntentType::CreateFile)
        .assert_source(IntentSource::Model)
        .assert(Assertion::IntentTarget(Some("src/nice.py".into())))
        .assert_model_calls(1)
        .run()
        .unwrap();
}

#[test]
fn test_unsure_model_answer_asks_first() {
    Scenario::new("model_low_confidence")
        .from_fixture("default")
        .model_answers(json!({ "intent_type": "edit_file", "target_path": "src/utils.py" }))
        .user_says("create something nice")
        .assert_response(ResponseMatch::ConfirmLowConfidence)
        .assert_intent(IntentType::EditFile)
        .user_declines()
        .assert_response(ResponseMatch::Done)
        .assert(Assertion::ResponseContains("cancelled".into()))
        .assert(Assertion::NoPendingTurn)
        .assert_turn_count(1)
        .run()
        .unwrap();
}

#[test]
fn test_model_timeout_falls_back_to_best_guess() {
    Scenario::new("model_timeout")
        .from_fixture("default")
        .with_model_timeout(Duration::from_millis(50))
        .model_replies(Reply::Slow(
            Duration::from_millis(500),
            json!({ "intent_type": "delete_file", "confidence": 1.0 }),
        ))
        .user_says("create something nice")
        .assert_response(ResponseMatch::Proceed)
        .assert_intent(IntentType::CreateFile)
        .assert_source(IntentSource::Fallback)
        .assert_model_calls(1)
        .host_completes("nothing to do")
        .assert_turn_count(1)
        .run()
        .unwrap();
}

#[test]
fn test_malformed_model_output_falls_back() {
    let answers = [
        json!("create_file"),
        json!({ "intent_type": "teleport" }),
        json!({ "intent_type": "create_file", "confidence": 7 }),
        json!({ "intent_type": "unknown" }),
        json!({ "intent_type": "create_file", "parameters": { "nested": { "a": 1 } } }),
    ];
    for answer in answers {
        Scenario::new("model_malformed")
            .from_fixture("default")
            .model_answers(answer)
            .user_says("create something nice")
            .assert_response(ResponseMatch::Proceed)
            .assert_source(IntentSource::Fallback)
            .assert_intent(IntentType::CreateFile)
            .run()
            .unwrap();
    }
}

#[test]
fn test_unreachable_model_and_no_guess_shows_help() {
    Scenario::new("model_down_no_guess")
        .from_fixture("default")
        .model_replies(Reply::Fail("connection refused".into()))
        .user_says("the weather is lovely today")
        .assert_response(ResponseMatch::Help)
        .assert(Assertion::ResponseContains("could not understand request".into()))
        .assert_intent(IntentType::Unknown)
        .assert_model_calls(1)
        .assert_turn_count(1)
        .assert(Assertion::NoPendingTurn)
        .run()
        .unwrap();
}

#[test]
fn test_model_sees_bounded_context() {
    Scenario::new("model_context")
        .from_fixture("default")
        .turn_writing("create src/a.py", "src/a.py", b"x = 1\n")
        .turn_writing("create src/b.py", "src/b.py", b"x = 2\n")
        .turn_writing("create src/c.py", "src/c.py", b"x = 3\n")
        .turn_writing("create src/d.py", "src/d.py", b"x = 4\n")
        .model_answers(json!({ "intent_type": "explain_code", "target_path": "src/generator.py", "confidence": 0.8 }))
        .user_says("explain CodeGenerator please")
        .assert_model_calls(1)
        .assert(Assertion::ModelSawTurns(3))
        .assert(Assertion::ModelSawActiveFile(Some("src/d.py".into())))
        .assert_source(IntentSource::Model)
        .assert_intent(IntentType::ExplainCode)
        .run()
        .unwrap();
}

#[test]
fn test_help_and_status_phrases() {
    Scenario::new("help_and_status")
        .from_fixture("default")
        .user_says("what can you do?")
        .assert_response(ResponseMatch::Help)
        .assert(Assertion::ResponseContains("undo".into()))
        .user_says("show the status")
        .assert_response(ResponseMatch::Proceed)
        .assert_intent(IntentType::Status)
        .host_completes("status shown")
        .assert_turn_count(2)
        .assert_model_calls(0)
        .run()
        .unwrap();
}
