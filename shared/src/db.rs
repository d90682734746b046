//! Read-only access to the survey data store.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info, warn};

use crate::dto::{Answer, Question, SurveyContext};
use crate::error::{AppError, Result};

/// A survey as stored, with the id needed to look up its questions.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSurvey {
    pub survey_id: i32,
    pub context: SurveyContext,
}

/// Source of raw answers. The pipeline never writes through this interface.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn fetch_survey(&self, name: &str) -> Result<StoredSurvey>;
    async fn fetch_questions(&self, survey_id: i32) -> Result<Vec<Question>>;
    async fn fetch_answers(&self, question_ids: &[i32]) -> Result<Vec<Answer>>;
}

pub struct PgAnswerStore {
    client: Client,
}

fn want_tls(database_url: &str) -> bool {
    let Some(q) = database_url.split_once('?').map(|(_, q)| q) else {
        return true;
    };
    for pair in q.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k.eq_ignore_ascii_case("sslmode") {
            return !v.eq_ignore_ascii_case("disable");
        }
    }
    true
}

impl PgAnswerStore {
    /// Connect with TLS unless the URL says `sslmode=disable`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        if want_tls(database_url) {
            let tls = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| AppError::Database(format!("building TLS connector: {e}")))?;
            let tls = postgres_native_tls::MakeTlsConnector::new(tls);
            let (client, connection) = tokio_postgres::connect(database_url, tls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(%e, "postgres connection task ended with error (TLS)");
                }
            });
            info!("Connected to PostgreSQL (TLS).");
            return Ok(Self { client });
        }

        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(%e, "postgres connection task ended with error (NoTLS)");
            }
        });
        info!("Connected to PostgreSQL (NoTLS).");
        Ok(Self { client })
    }

    /// Wrap an already connected client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Integer column as `i64`, whichever of INT2, INT4 or INT8 the table uses.
fn int_column(row: &Row, col: &str) -> Result<i64> {
    if let Ok(v) = row.try_get::<_, i64>(col) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<_, i32>(col) {
        return Ok(v.into());
    }
    let v: i16 = row.try_get(col)?;
    Ok(v.into())
}

fn id_column(row: &Row, col: &str) -> Result<i32> {
    let v = int_column(row, col)?;
    i32::try_from(v).map_err(|_| AppError::Database(format!("{col} value {v} out of range")))
}

/// Nullable numeric column read as `f64` from FLOAT8, FLOAT4 or INT4.
fn float_column(row: &Row, col: &str) -> Result<Option<f64>> {
    if let Ok(v) = row.try_get::<_, Option<f64>>(col) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<_, Option<f32>>(col) {
        return Ok(v.map(f64::from));
    }
    let v: Option<i32> = row.try_get(col)?;
    Ok(v.map(f64::from))
}

fn answer_from_row(row: &Row) -> Result<Answer> {
    Ok(Answer {
        answer_id: int_column(row, "AnswerID")?,
        question_id: id_column(row, "QuestionID")?,
        text: row.try_get("StringResponse")?,
        numeric_value: float_column(row, "NumericalResponse")?,
    })
}

/// Questions without text cannot be prompted and are skipped.
fn question_from_row(row: &Row) -> Result<Option<Question>> {
    let question_id = id_column(row, "QuestionID")?;
    let text: Option<String> = row.try_get("QuestionText")?;
    Ok(question_text(question_id, text))
}

fn question_text(question_id: i32, text: Option<String>) -> Option<Question> {
    match text {
        Some(text) if !text.trim().is_empty() => Some(Question { question_id, text }),
        _ => {
            warn!(question_id, "skipping question without text");
            None
        }
    }
}

#[async_trait]
impl AnswerStore for PgAnswerStore {
    async fn fetch_survey(&self, name: &str) -> Result<StoredSurvey> {
        let row = self
            .client
            .query_opt(
                r#"SELECT "SurveyID", "SurveyName", "SurveyDescription"
                   FROM surveys WHERE "SurveyName" = $1"#,
                &[&name],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("survey {name}")))?;
        let survey_name: Option<String> = row.try_get("SurveyName")?;
        let description: Option<String> = row.try_get("SurveyDescription")?;
        Ok(StoredSurvey {
            survey_id: id_column(&row, "SurveyID")?,
            context: SurveyContext {
                name: survey_name.unwrap_or_else(|| name.to_string()),
                description: description.unwrap_or_default(),
            },
        })
    }

    async fn fetch_questions(&self, survey_id: i32) -> Result<Vec<Question>> {
        let rows = self
            .client
            .query(
                r#"SELECT "QuestionID", "QuestionText"
                   FROM questions WHERE "SurveyID"::int8 = $1
                   ORDER BY "QuestionID""#,
                &[&i64::from(survey_id)],
            )
            .await?;
        let mut questions = Vec::with_capacity(rows.len());
        for row in &rows {
            questions.extend(question_from_row(row)?);
        }
        Ok(questions)
    }

    async fn fetch_answers(&self, question_ids: &[i32]) -> Result<Vec<Answer>> {
        if question_ids.is_empty() {
            warn!("fetch_answers called without question ids");
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = question_ids.iter().map(|&id| i64::from(id)).collect();
        let rows = self
            .client
            .query(
                r#"SELECT "AnswerID", "QuestionID", "StringResponse", "NumericalResponse"
                   FROM answers WHERE "QuestionID"::int8 = ANY($1)
                   ORDER BY "QuestionID", "AnswerID""#,
                &[&ids],
            )
            .await?;
        rows.iter().map(answer_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_follows_sslmode() {
        assert!(want_tls("postgres://u@h/db"));
        assert!(want_tls("postgres://u@h/db?sslmode=require"));
        assert!(!want_tls("postgres://u@h/db?application_name=x&sslmode=disable"));
    }

    #[test]
    fn blank_question_text_is_skipped() {
        assert!(question_text(4, None).is_none());
        assert!(question_text(4, Some("  ".into())).is_none());
        assert_eq!(
            question_text(4, Some("Comment?".into())),
            Some(Question {
                question_id: 4,
                text: "Comment?".into()
            })
        );
    }
}
