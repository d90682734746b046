use shared::db::{AnswerStore, PgAnswerStore};
use tokio_postgres::NoTls;

/// Temporary tables shadow the real ones for this session only. INTEGER ids
/// and a NULL question text are both valid layouts of the survey tables.
const FIXTURE: &str = r#"
    CREATE TEMP TABLE surveys ("SurveyID" BIGINT, "SurveyName" TEXT, "SurveyDescription" TEXT);
    CREATE TEMP TABLE questions ("QuestionID" INTEGER, "SurveyID" INTEGER, "QuestionText" TEXT);
    CREATE TEMP TABLE answers (
        "AnswerID" INTEGER, "QuestionID" INTEGER,
        "StringResponse" TEXT, "NumericalResponse" REAL
    );
    INSERT INTO surveys VALUES (3, 'Staff 2024', NULL);
    INSERT INTO questions VALUES (1, 3, 'Comment?'), (2, 3, NULL);
    INSERT INTO answers VALUES
        (10, 1, 'the canteen is far too expensive', NULL),
        (11, 1, NULL, 4.5),
        (12, 2, 'no text question', NULL);
"#;

#[tokio::test]
#[ignore]
async fn reads_integer_ids_and_null_text() {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/postgres".into());
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await.unwrap();
    tokio::spawn(connection);
    client.batch_execute(FIXTURE).await.unwrap();
    let store = PgAnswerStore::from_client(client);

    let survey = store.fetch_survey("Staff 2024").await.unwrap();
    assert_eq!(survey.survey_id, 3);
    assert_eq!(survey.context.description, "");

    let questions = store.fetch_questions(survey.survey_id).await.unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].text, "Comment?");

    let answers = store.fetch_answers(&[1, 2]).await.unwrap();
    let ids: Vec<i64> = answers.iter().map(|a| a.answer_id).collect();
    assert_eq!(ids, [10, 11, 12]);
    assert!(answers[1].text.is_none());
    assert_eq!(answers[1].numeric_value, Some(4.5));
}
