/*
    Racing moderators and racing members: every contested transition has
    exactly one winner.
*/

mod common;

use common::{done, group, question, user, Harness};
use gatehouse_core::core_onboarding::{
    AnswerValue, AppealOutcome, ApplicationStatus, NotEligibleReason, Outcome, Refusal, ReviewOutcome, RoleTier,
    SubmissionKind,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decisions_have_one_winner() {
    let h = Harness::new();
    let first = h.moderator().await;
    let second = h.staff("mod-2", RoleTier::Moderator).await;
    let submission = h.submit_application("alice", "b").await;

    let approve = {
        let service = h.service.clone();
        let id = submission.id;
        tokio::spawn(async move {
            service.decide(id, &first, ReviewOutcome::Approve { tier: RoleTier::Member }).await
        })
    };
    let reject = {
        let service = h.service.clone();
        let id = submission.id;
        tokio::spawn(async move {
            service.decide(id, &second, ReviewOutcome::Reject { reason: None, ban: false }).await
        })
    };

    let results = [
        approve.await.expect("task").expect("storage"),
        reject.await.expect("task").expect("storage"),
    ];
    let winners = results.iter().filter(|outcome| outcome.is_done()).count();
    let losers: Vec<_> = results.iter().filter_map(|outcome| outcome.refusal()).collect();
    assert_eq!(winners, 1);
    assert_eq!(losers, vec![&Refusal::AlreadyDecided]);

    let member = done(h.service.member(&group(), &user("alice")).await);
    assert!(matches!(member.status, ApplicationStatus::Approved | ApplicationStatus::Rejected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appeal_decisions_have_one_winner() {
    let h = Harness::new();
    let moderator = h.moderator().await;
    let other = h.staff("mod-2", RoleTier::Moderator).await;

    let submission = h.submit_application("bob", "b").await;
    done(h.service.decide(submission.id, &moderator, ReviewOutcome::Reject { reason: None, ban: false }).await);
    let appeal = done(h.service.file_appeal(&group(), &user("bob"), "second chance").await);

    let mut tasks = Vec::new();
    for (reviewer, outcome) in [
        (moderator, AppealOutcome::Approve { note: None }),
        (other, AppealOutcome::Reject { note: Some("no".to_string()) }),
    ] {
        let service = h.service.clone();
        let id = appeal.id;
        tasks.push(tokio::spawn(async move { service.decide_appeal(id, &reviewer, outcome).await }));
    }

    let mut winners = 0;
    let mut already_decided = 0;
    for task in futures::future::join_all(tasks).await {
        match task.expect("task").expect("storage") {
            Outcome::Done(_) => winners += 1,
            Outcome::Refused(Refusal::AlreadyDecided) => already_decided += 1,
            Outcome::Refused(other) => panic!("unexpected refusal: {}", other),
        }
    }
    assert_eq!((winners, already_decided), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appeals_spend_the_right_once() {
    let h = Harness::new();
    let moderator = h.moderator().await;
    let submission = h.submit_application("cara", "b").await;
    done(h.service.decide(submission.id, &moderator, ReviewOutcome::Reject { reason: None, ban: false }).await);

    let tasks: Vec<_> = (0..4)
        .map(|n| {
            let service = h.service.clone();
            tokio::spawn(async move { service.file_appeal(&group(), &user("cara"), &format!("attempt {}", n)).await })
        })
        .collect();

    let mut filed = 0;
    for task in futures::future::join_all(tasks).await {
        match task.expect("task").expect("storage") {
            Outcome::Done(_) => filed += 1,
            Outcome::Refused(refusal) => {
                assert_eq!(refusal, Refusal::NotEligible(NotEligibleReason::AppealAlreadyUsed))
            }
        }
    }
    assert_eq!(filed, 1);

    let queue = done(h.service.list_pending(&group()).await);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_members_progress_independently() {
    let h = Harness::new();

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let service = h.service.clone();
            tokio::spawn(async move {
                let applicant = user(&format!("applicant-{}", n));
                service
                    .start_or_resume_session(&group(), &applicant, SubmissionKind::Applicant, None)
                    .await
                    .expect("storage");
                service
                    .submit_answer(&group(), &applicant, &question("q1"), AnswerValue::choice("b"))
                    .await
                    .expect("storage")
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        assert!(task.expect("task").is_done());
    }
    assert_eq!(done(h.service.list_pending(&group()).await).len(), 8);
}
