//! End-to-end quiz conversations against the fixture notes.
//!
//! Drives the engine the way a chat transport would: raw message strings
//! resolved through `QuizInput::from_message`, replies checked for text and
//! keyboard options.

use std::sync::Arc;

use lecture_core::{
    build_gateway, Config, Dice, MenuAction, QuizEngine, QuizInput, Reply, SessionStatus, UserId,
    RANDOM_TOPIC_LABEL,
};

fn fixture_notes() -> String {
    format!("{}/fixtures/notes", env!("CARGO_MANIFEST_DIR"))
}

/// Builds an engine with the heuristic gateway and a fixed seed.
fn engine() -> QuizEngine {
    let mut config = Config::default();
    config.notes_directory = fixture_notes();
    config.random_seed = Some(7);
    config.gateway.perturbation_chance = 0.0;
    config.validate().expect("fixture config is valid");

    let dice = Arc::new(Dice::from_seed_option(config.random_seed));
    let gateway = build_gateway(&config.gateway, Arc::clone(&dice)).expect("heuristic gateway");
    QuizEngine::from_config(&config, gateway, dice)
}

async fn send(engine: &QuizEngine, user: &UserId, message: &str) -> Reply {
    engine.handle(user, QuizInput::from_message(message)).await
}

fn options(reply: &Reply) -> Vec<String> {
    reply.keyboard.clone().unwrap_or_default()
}

async fn status(engine: &QuizEngine, user: &UserId) -> SessionStatus {
    engine
        .session_snapshot(user)
        .await
        .expect("session exists")
        .status
}

#[tokio::test]
async fn test_full_study_conversation() {
    let engine = engine();
    let user = UserId::from(1001_i64);

    let reply = send(&engine, &user, "/start").await;
    assert!(reply.text.contains("Welcome"));
    assert_eq!(status(&engine, &user).await, SessionStatus::Idle);

    let reply = send(&engine, &user, "/study").await;
    assert_eq!(reply.text, "Choose a subject to study:");
    assert_eq!(options(&reply), vec!["Bio", "Math"]);

    let reply = send(&engine, &user, "Chemistry").await;
    assert!(reply.text.contains("Subject 'Chemistry' not found"));
    assert!(reply.text.contains("Bio, Math"));
    assert_eq!(status(&engine, &user).await, SessionStatus::Idle);

    let reply = send(&engine, &user, "Math").await;
    assert!(reply.text.contains("You selected 'Math'"));
    assert_eq!(options(&reply), vec!["Algebra", RANDOM_TOPIC_LABEL]);
    assert_eq!(status(&engine, &user).await, SessionStatus::SubjectChosen);

    let reply = send(&engine, &user, "Algebra").await;
    assert!(reply.text.starts_with("📝 Question (Math / Algebra):"));
    assert!(reply.text.ends_with("Type your answer below."));
    assert_eq!(status(&engine, &user).await, SessionStatus::AwaitingAnswer);

    let reply = send(&engine, &user, "no idea").await;
    assert!(reply.text.starts_with("✅ Score: 0/3"), "got: {}", reply.text);
    assert!(reply.text.contains("📖 Source: "));
    assert!(
        reply.text.contains("linear-equations.md") || reply.text.contains("quadratics.md"),
        "got: {}",
        reply.text
    );
    assert_eq!(options(&reply), MenuAction::keyboard());

    let reply = send(&engine, &user, MenuAction::ViewStats.label()).await;
    assert!(reply.text.contains("Questions answered: 1"));
    assert!(reply.text.contains("Average score: 0.0/3"));

    let reply = send(&engine, &user, MenuAction::RepeatQuestion.label()).await;
    assert!(reply.text.starts_with("📝 Question (Math / Algebra):"));

    let reply = send(
        &engine,
        &user,
        "A linear equation ax + b = 0 has the single solution x = -b / a when a is not zero.",
    )
    .await;
    assert!(reply.text.starts_with("✅ Score: "));

    let snapshot = engine.session_snapshot(&user).await.expect("session exists");
    assert_eq!(snapshot.stats.answered, 2);
    assert_eq!(snapshot.subject.as_deref(), Some("Math"));
    assert_eq!(snapshot.topic.as_deref(), Some("Algebra"));
    assert!(snapshot.question.is_none());
}

#[tokio::test]
async fn test_reserved_and_empty_units() {
    let engine = engine();
    let user = UserId::from("bio-student");

    send(&engine, &user, "/study").await;
    let reply = send(&engine, &user, "Bio").await;
    assert_eq!(options(&reply), vec!["Cells", "Genetics", RANDOM_TOPIC_LABEL]);

    // Genetics only holds a heading and a one-word line
    let reply = send(&engine, &user, "Genetics").await;
    assert!(reply.text.contains("No suitable passage found in 'Bio/Genetics'"));
    assert_eq!(status(&engine, &user).await, SessionStatus::SubjectChosen);

    // state.md is never a passage source
    for _ in 0..10 {
        let reply = send(&engine, &user, "Cells").await;
        assert!(reply.text.starts_with("📝 Question (Bio / Cells):"));
        let reply = send(&engine, &user, "mitochondria").await;
        assert!(reply.text.contains("📖 Source: organelles.md"), "got: {}", reply.text);
    }
}

#[tokio::test]
async fn test_menu_navigation() {
    let engine = engine();
    let user = UserId::from("navigator");

    let reply = send(&engine, &user, MenuAction::ChangeTopic.label()).await;
    assert!(reply.text.contains("choose a subject first"));

    let reply = send(&engine, &user, RANDOM_TOPIC_LABEL).await;
    assert!(reply.text.contains("choose a subject first"));

    send(&engine, &user, "/study").await;
    send(&engine, &user, "Math").await;
    let reply = send(&engine, &user, RANDOM_TOPIC_LABEL).await;
    assert!(reply.text.starts_with("📝 Question (Math / Algebra):"));

    // Commands other than restart/study leave the question in place
    let reply = send(&engine, &user, "/stats").await;
    assert!(reply.text.contains("haven't answered"));
    assert_eq!(status(&engine, &user).await, SessionStatus::AwaitingAnswer);

    let reply = send(&engine, &user, MenuAction::ChangeTopic.label()).await;
    assert!(reply.text.contains("Choose a new topic in 'Math'"));
    assert_eq!(status(&engine, &user).await, SessionStatus::SubjectChosen);

    let reply = send(&engine, &user, MenuAction::MainMenu.label()).await;
    assert_eq!(options(&reply), vec!["Bio", "Math"]);
    assert_eq!(status(&engine, &user).await, SessionStatus::Idle);

    let reply = send(&engine, &user, "/restart").await;
    assert!(reply.text.contains("Welcome"));
}

#[tokio::test]
async fn test_concurrent_users_stay_isolated() {
    let engine = Arc::new(engine());

    let mut handles = Vec::new();
    for id in 0..8_i64 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let user = UserId::from(id);
            send(&engine, &user, "/study").await;
            let subject = if id % 2 == 0 { "Math" } else { "Bio" };
            let topic = if id % 2 == 0 { "Algebra" } else { "Cells" };
            send(&engine, &user, subject).await;
            let reply = send(&engine, &user, topic).await;
            assert!(reply.text.contains(&format!("({subject} / {topic})")));
            send(&engine, &user, "some answer").await;
            (user, subject)
        }));
    }

    for handle in handles {
        let (user, subject) = handle.await.expect("task completed");
        let snapshot = engine.session_snapshot(&user).await.expect("session exists");
        assert_eq!(snapshot.subject.as_deref(), Some(subject));
        assert_eq!(snapshot.stats.answered, 1);
    }
    assert_eq!(engine.sessions().len(), 8);
}

#[tokio::test]
async fn test_missing_notes_directory() {
    let mut config = Config::default();
    config.notes_directory = format!("{}/fixtures/does-not-exist", env!("CARGO_MANIFEST_DIR"));
    let dice = Arc::new(Dice::seeded(1));
    let gateway = build_gateway(&config.gateway, Arc::clone(&dice)).expect("heuristic gateway");
    let engine = QuizEngine::from_config(&config, gateway, dice);

    let reply = send(&engine, &UserId::from("lost"), "/study").await;
    assert!(reply.text.contains("No study materials found"));
    assert!(reply.keyboard.is_none());
}
