//! Persistence for accepted questions.
//!
//! The [`QuestionStore`] trait is the gateway the HTTP API and CLI save
//! through. [`SqliteQuestionStore`] writes to the `questions` table;
//! [`InMemoryQuestionStore`] backs tests.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::{GeneratedQuestion, TopicArea};

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Inserts all questions, returning how many were written.
    async fn insert_questions(&self, questions: &[GeneratedQuestion]) -> Result<usize>;

    /// Counts stored questions, optionally for one topic.
    async fn count_questions(&self, topic: Option<TopicArea>) -> Result<i64>;
}

// ============ SQLite ============

pub struct SqliteQuestionStore {
    pool: SqlitePool,
}

impl SqliteQuestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for SqliteQuestionStore {
    async fn insert_questions(&self, questions: &[GeneratedQuestion]) -> Result<usize> {
        if questions.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for q in questions {
            sqlx::query(
                r#"
                INSERT INTO questions (
                    id, question_text, option_a, option_b, option_c, correct_answer,
                    explanation, difficulty_level, topic_area, subtopic,
                    learning_objective_id, keywords_json, source_material, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&q.question_text)
            .bind(&q.option_a)
            .bind(&q.option_b)
            .bind(&q.option_c)
            .bind(q.correct_answer.as_str())
            .bind(&q.explanation)
            .bind(q.difficulty_level.as_str())
            .bind(q.topic_area.as_str())
            .bind(&q.subtopic)
            .bind(&q.learning_objective_id)
            .bind(serde_json::to_string(&q.keywords)?)
            .bind(&q.source_material)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(questions.len())
    }

    async fn count_questions(&self, topic: Option<TopicArea>) -> Result<i64> {
        let n: i64 = match topic {
            Some(t) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE topic_area = ?")
                    .bind(t.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM questions")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(n)
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryQuestionStore {
    questions: RwLock<Vec<GeneratedQuestion>>,
}

impl InMemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<GeneratedQuestion> {
        self.questions.read().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn insert_questions(&self, questions: &[GeneratedQuestion]) -> Result<usize> {
        let mut stored = self
            .questions
            .write()
            .map_err(|_| anyhow::anyhow!("question store lock poisoned"))?;
        stored.extend_from_slice(questions);
        Ok(questions.len())
    }

    async fn count_questions(&self, topic: Option<TopicArea>) -> Result<i64> {
        let stored = self
            .questions
            .read()
            .map_err(|_| anyhow::anyhow!("question store lock poisoned"))?;
        let n = stored
            .iter()
            .filter(|q| topic.map_or(true, |t| q.topic_area == t))
            .count();
        Ok(n as i64)
    }
}
