//! Quiz completion path: after the watch time is met the user may answer
//! the campaign's questions instead of a plain claim. Grading and coins
//! come from the server.

use crate::{
    api::ApiClient,
    claim::ClaimPermit,
    error::{GatewayError, GatewayResult},
    models::{Quiz, QuizResult, QuizSubmission},
    timer::{TimerPhase, VisitSnapshot},
};

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

pub async fn fetch_quiz(api: &ApiClient, snapshot: &VisitSnapshot) -> GatewayResult<Quiz> {
    if snapshot.phase != TimerPhase::Complete {
        return Err(GatewayError::ClaimNotReady);
    }
    api.quiz(&snapshot.campaign_id).await
}

/// Checks answer count and option bounds before anything is sent.
pub fn validate_answers(quiz: &Quiz, answers: &[usize]) -> GatewayResult<()> {
    if answers.len() != quiz.questions.len() {
        return Err(GatewayError::InvalidAnswers(format!(
            "expected {} answers, got {}",
            quiz.questions.len(),
            answers.len()
        )));
    }
    for (index, (question, answer)) in quiz.questions.iter().zip(answers).enumerate() {
        if *answer >= question.options.len() {
            return Err(GatewayError::InvalidAnswers(format!(
                "question {} has no option {}",
                index + 1,
                answer + 1
            )));
        }
    }
    Ok(())
}

/// Sends validated answers under a permit the caller already holds.
pub async fn send_answers(
    api: &ApiClient,
    permit: &ClaimPermit,
    token: &str,
    snapshot: &VisitSnapshot,
    quiz: &Quiz,
    answers: Vec<usize>,
) -> GatewayResult<QuizResult> {
    let submission = QuizSubmission {
        token: token.to_string(),
        campaign_id: quiz.campaign_id.clone(),
        answers,
    };

    match api.submit_quiz(&submission).await {
        Ok(result) => {
            permit.settle();
            log_info!(
                "quiz for visit {} graded {}/{} ({})",
                snapshot.visit_id,
                result.correct,
                result.total,
                result.tier().label()
            );
            Ok(result)
        }
        Err(err) => {
            log_warn!("quiz submission for visit {} failed: {err}", snapshot.visit_id);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::test_server,
        claim::ClaimGate,
        models::{QuizQuestion, RewardTier},
        timer::PauseReasons,
    };
    use std::time::Duration;

    fn quiz() -> Quiz {
        Quiz {
            campaign_id: "c-1".into(),
            questions: vec![
                QuizQuestion {
                    id: "q1".into(),
                    prompt: "?".into(),
                    options: vec!["a".into(), "b".into()],
                },
                QuizQuestion {
                    id: "q2".into(),
                    prompt: "?".into(),
                    options: vec!["a".into(), "b".into()],
                },
            ],
        }
    }

    fn snapshot(phase: TimerPhase) -> VisitSnapshot {
        VisitSnapshot {
            visit_id: "v1".into(),
            campaign_id: "c-1".into(),
            campaign_url: "https://ad.example".into(),
            phase,
            elapsed_secs: 10,
            credited_secs: 10,
            required_secs: 10,
            remaining_secs: 0,
            progress_percent: 100,
            pause_reasons: PauseReasons::default(),
            popup_open: false,
            attending: false,
            mouse_movements: 0,
        }
    }

    #[test]
    fn rejects_wrong_answer_count_and_out_of_range_option() {
        assert!(matches!(
            validate_answers(&quiz(), &[0]),
            Err(GatewayError::InvalidAnswers(_))
        ));
        assert!(matches!(
            validate_answers(&quiz(), &[0, 2]),
            Err(GatewayError::InvalidAnswers(_))
        ));
        assert!(validate_answers(&quiz(), &[1, 0]).is_ok());
    }

    #[tokio::test]
    async fn quiz_is_gated_on_completion() {
        let server = test_server::spawn(10, 0).await;
        let api = ApiClient::new(&server.base_url, None, Duration::from_secs(2)).unwrap();
        let err = fetch_quiz(&api, &snapshot(TimerPhase::Running)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ClaimNotReady));

        let fetched = fetch_quiz(&api, &snapshot(TimerPhase::Complete)).await.unwrap();
        assert_eq!(fetched.questions.len(), 2);
    }

    #[tokio::test]
    async fn graded_submission_settles_gate() {
        let server = test_server::spawn(10, 20).await;
        let api = ApiClient::new(&server.base_url, None, Duration::from_secs(2)).unwrap();
        let gate = ClaimGate::new();
        let complete = snapshot(TimerPhase::Complete);

        let permit = gate.begin(&complete).unwrap();
        let result = send_answers(&api, &permit, "tok", &complete, &quiz(), vec![1, 1])
            .await
            .unwrap();
        drop(permit);

        assert_eq!(result.correct, 1);
        assert_eq!(result.tier(), RewardTier::Partial);
        assert_eq!(result.new_balance, 23);
        assert!(gate.is_settled());
    }
}
