/*
    Application sessions: branching traversal, completion, abandon and
    self-service reset.
*/

mod common;

use common::{done, group, question, refused, user, Harness, MOD_QUEUE};
use gatehouse_core::core_onboarding::notify::Recorded;
use gatehouse_core::core_onboarding::{
    AnswerValue, ApplicationStatus, ChannelRef, GroupId, NotEligibleReason, Refusal, ReviewOutcome, RoleRef,
    RoleTier, SessionStep, SubmissionKind, SubmissionStatus,
};

#[tokio::test]
async fn test_branch_not_taken_is_never_asked() {
    let h = Harness::new();
    let alice = user("alice");

    let submission = h.submit_application("alice", "b").await;
    assert_eq!(submission.status, SubmissionStatus::Pending);
    assert_eq!(submission.answers.len(), 1);
    assert_eq!(submission.answers[0].question, question("q1"));
    assert!(!submission.flagged);

    // A second completion signal reports the same pending submission
    let again = done(h.service.complete_session(&group(), &alice).await);
    match again {
        SessionStep::AlreadyPending(pending) => assert_eq!(pending.id, submission.id),
        other => panic!("expected AlreadyPending, got {:?}", other),
    }

    let member = done(h.service.member(&group(), &alice).await);
    assert_eq!(member.status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn test_branch_taken_asks_child_question() {
    let h = Harness::new();
    let bob = user("bob");

    let first = done(h.service.start_or_resume_session(&group(), &bob, SubmissionKind::Applicant, None).await);
    assert_eq!(first.question().map(|q| q.id.clone()), Some(question("q1")));

    let second = done(h.service.submit_answer(&group(), &bob, &question("q1"), AnswerValue::choice("a")).await);
    assert_eq!(second.question().map(|q| q.id.clone()), Some(question("q2")));

    let last = done(
        h.service.submit_answer(&group(), &bob, &question("q2"), AnswerValue::text("  carol  ")).await,
    );
    let submission = last.submission().cloned().expect("session completes after q2");
    let asked: Vec<_> = submission.answers.iter().map(|a| a.question.as_str().to_string()).collect();
    assert_eq!(asked, vec!["q1", "q2"]);
    assert_eq!(submission.answers[1].value, AnswerValue::text("carol"));
}

#[tokio::test]
async fn test_changing_parent_answer_closes_branch() {
    let h = Harness::new();
    let dana = user("dana");

    done(h.service.start_or_resume_session(&group(), &dana, SubmissionKind::Applicant, None).await);
    done(h.service.submit_answer(&group(), &dana, &question("q1"), AnswerValue::choice("a")).await);

    let step = done(h.service.submit_answer(&group(), &dana, &question("q1"), AnswerValue::choice("b")).await);
    let submission = step.submission().cloned().expect("q2 is no longer reachable");
    assert_eq!(submission.answers.len(), 1);
    assert_eq!(submission.answers[0].value, AnswerValue::choice("b"));
}

#[tokio::test]
async fn test_out_of_order_and_invalid_answers_are_refused() {
    let h = Harness::new();
    let erin = user("erin");

    done(h.service.start_or_resume_session(&group(), &erin, SubmissionKind::Applicant, None).await);

    let skipped = refused(h.service.submit_answer(&group(), &erin, &question("q2"), AnswerValue::text("x")).await);
    assert!(matches!(skipped, Refusal::Validation(_)));

    let unknown = refused(h.service.submit_answer(&group(), &erin, &question("q9"), AnswerValue::text("x")).await);
    assert!(matches!(unknown, Refusal::Validation(_)));

    let bad_option =
        refused(h.service.submit_answer(&group(), &erin, &question("q1"), AnswerValue::choice("z")).await);
    assert!(matches!(bad_option, Refusal::Validation(_)));

    // Nothing was recorded
    let resumed = done(h.service.start_or_resume_session(&group(), &erin, SubmissionKind::Applicant, None).await);
    assert_eq!(resumed.question().map(|q| q.id.clone()), Some(question("q1")));
}

#[tokio::test]
async fn test_resume_keeps_the_same_submission() {
    let h = Harness::new();
    let finn = user("finn");

    let first = done(h.service.start_or_resume_session(&group(), &finn, SubmissionKind::Applicant, None).await);
    let again = done(h.service.start_or_resume_session(&group(), &finn, SubmissionKind::Applicant, None).await);

    match (first, again) {
        (SessionStep::Question { submission: a, .. }, SessionStep::Question { submission: b, .. }) => {
            assert_eq!(a, b)
        }
        other => panic!("expected two question steps, got {:?}", other),
    }
}

#[tokio::test]
async fn test_flagged_submission_is_posted_with_reason() {
    let mut h = Harness::new();

    let submission = h.submit_application("gwen", "refuse").await;
    assert!(submission.flagged);
    assert!(submission.flag_reason.as_deref().unwrap_or_default().contains("I do not accept the rules"));

    h.flush().await;
    let posts = h.messenger.channel_messages(&ChannelRef::new(MOD_QUEUE));
    assert_eq!(posts.len(), 1);
    assert!(posts[0].contains("<@gwen>"));
    assert!(posts[0].contains("Flagged"));
}

#[tokio::test]
async fn test_referral_goes_straight_to_review() {
    let h = Harness::new();
    let hana = user("hana");

    let step = done(
        h.service
            .start_or_resume_session(&group(), &hana, SubmissionKind::Referral, Some("vouched by ivan"))
            .await,
    );
    let submission = step.submission().cloned().expect("referrals skip the questionnaire");
    assert_eq!(submission.kind, SubmissionKind::Referral);
    assert_eq!(submission.referral_note.as_deref(), Some("vouched by ivan"));
    assert!(submission.answers.is_empty());
}

#[tokio::test]
async fn test_abandon_returns_member_to_no_application() {
    let h = Harness::new();
    let ivy = user("ivy");

    done(h.service.start_or_resume_session(&group(), &ivy, SubmissionKind::Applicant, None).await);
    let member = done(h.service.abandon_session(&group(), &ivy).await);
    assert_eq!(member.status, ApplicationStatus::None);

    let refusal = refused(h.service.submit_answer(&group(), &ivy, &question("q1"), AnswerValue::choice("b")).await);
    assert_eq!(refusal, Refusal::NotEligible(NotEligibleReason::NotStarted));

    let again = refused(h.service.abandon_session(&group(), &ivy).await);
    assert_eq!(again, Refusal::NotEligible(NotEligibleReason::NotStarted));
}

#[tokio::test]
async fn test_group_without_graph_is_not_configured() {
    let h = Harness::new();
    let elsewhere = GroupId::new("other-guild");

    let refusal = refused(
        h.service.start_or_resume_session(&elsewhere, &user("jay"), SubmissionKind::Applicant, None).await,
    );
    assert_eq!(refusal, Refusal::NotConfigured(elsewhere));
}

#[tokio::test]
async fn test_reset_allowed_only_for_lowest_granted_tier() {
    let mut h = Harness::new();
    let moderator = h.moderator().await;

    let kim = h.submit_application("kim", "b").await;
    done(h.service.decide(kim.id, &moderator, ReviewOutcome::Approve { tier: RoleTier::Member }).await);
    h.flush().await;

    let report = done(h.service.request_reset(&group(), &user("kim")).await);
    assert_eq!(report.member.status, ApplicationStatus::InProgress);
    assert_eq!(report.member.role_tier, RoleTier::Applicant);
    assert_eq!(report.previous_tier, RoleTier::Member);
    assert_eq!(report.next.as_ref().and_then(|s| s.question()).map(|q| q.id.clone()), Some(question("q1")));

    h.flush().await;
    assert!(h.messenger.records().contains(&Recorded::RevokeRole {
        member: kim.member.clone(),
        role: RoleRef::new("role-member"),
    }));

    let lee = h.submit_application("lee", "b").await;
    done(h.service.decide(lee.id, &moderator, ReviewOutcome::Approve { tier: RoleTier::Trusted }).await);

    let refusal = refused(h.service.request_reset(&group(), &user("lee")).await);
    assert_eq!(refusal, Refusal::NotEligible(NotEligibleReason::ResetNotAllowed { tier: RoleTier::Trusted }));
    let lee = done(h.service.member(&group(), &user("lee")).await);
    assert_eq!(lee.status, ApplicationStatus::Approved);
    assert_eq!(lee.role_tier, RoleTier::Trusted);
}

#[tokio::test]
async fn test_reset_without_application_is_refused() {
    let h = Harness::new();

    let refusal = refused(h.service.request_reset(&group(), &user("nobody")).await);
    assert_eq!(refusal, Refusal::NotEligible(NotEligibleReason::NotStarted));
}
