//! Course quizzes.
//!
//! The backend stores a quiz in snake_case with explicit `order` fields.
//! Callers work with [`Quiz`], which keeps every question and choice
//! identified even before it has been saved.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::error::Result;

fn quiz_path(course_id: &str) -> String {
    format!("/api/courses/{course_id}/quiz/")
}

/// Statuses on which an upsert falls back from `PUT` to `POST`.
const CREATE_FALLBACK_STATUSES: [u16; 3] = [404, 405, 409];

/// Identifier of a quiz, question or choice.
///
/// Saved items carry backend ids (numbers or strings); unsaved ones carry a
/// locally generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl ItemId {
    /// Generates a fresh local id.
    #[must_use]
    pub fn generate() -> Self {
        Self::Text(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Kind of question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    /// One correct choice.
    MultipleChoice,
    /// Several correct choices.
    MultipleResponse,
    /// True or false.
    TrueFalse,
    /// Text with blanks between its parts.
    FillInTheBlank,
    /// Put choices in order.
    Sequencing,
    /// Pair choices with answers.
    Matching,
}

fn default_text_parts() -> Vec<String> {
    vec![String::new()]
}

/// A choice of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice id.
    pub id: ItemId,
    /// Choice text.
    #[serde(default)]
    pub text: String,
}

/// A quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question id.
    pub id: ItemId,
    /// Question kind.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Prompt.
    #[serde(default)]
    pub title: String,
    /// Choices, in display order.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Text around the blanks of a fill-in question.
    #[serde(default = "default_text_parts")]
    pub text_parts: Vec<String>,
    /// Correct answers.
    #[serde(default)]
    pub correct_answers: Vec<String>,
    /// Explicit position; defaults to the 1-based index when saving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl Question {
    fn filled_choices(&self) -> usize {
        self.choices.iter().filter(|c| !c.text.trim().is_empty()).count()
    }

    /// Returns `true` if the question has everything its kind needs.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        use QuestionType::{
            FillInTheBlank, Matching, MultipleChoice, MultipleResponse, Sequencing, TrueFalse,
        };

        let blank = |s: &String| s.trim().is_empty();
        match self.kind {
            FillInTheBlank => {
                let has_content = self.text_parts.iter().any(|p| !blank(p))
                    || self.correct_answers.iter().any(|a| !blank(a));
                has_content && !self.correct_answers.iter().any(blank)
            }
            _ if self.title.trim().is_empty() => false,
            MultipleChoice | MultipleResponse => {
                self.filled_choices() >= 2 && !self.correct_answers.is_empty()
            }
            TrueFalse => !self.correct_answers.is_empty(),
            Sequencing => {
                self.filled_choices() >= 2 && self.filled_choices() == self.correct_answers.len()
            }
            Matching => {
                self.filled_choices() >= 2
                    && !self.choices.iter().any(|c| blank(&c.text))
                    && !self.correct_answers.iter().any(blank)
            }
        }
    }
}

/// A quiz in client shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quiz {
    /// Quiz id; `None` until saved.
    #[serde(default)]
    pub id: Option<ItemId>,
    /// Quiz title.
    #[serde(default)]
    pub title: String,
    /// Questions.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Returns the index of the first incomplete question.
    #[must_use]
    pub fn first_incomplete(&self) -> Option<usize> {
        self.questions.iter().position(|q| !q.is_complete())
    }

    /// Maps to the backend shape.
    ///
    /// Question order falls back to the 1-based index; choice order is
    /// always the 1-based index.
    #[must_use]
    pub fn to_api(&self) -> ApiQuiz {
        ApiQuiz {
            id: self.id.clone(),
            title: Some(self.title.clone()),
            questions: Some(
                self.questions
                    .iter()
                    .zip(1_u32..)
                    .map(|(q, idx)| ApiQuestion {
                        id: Some(q.id.clone()),
                        order: Some(q.order.unwrap_or(idx)),
                        kind: q.kind,
                        title: Some(q.title.clone()),
                        text_parts: Some(q.text_parts.clone()),
                        correct_answers: Some(q.correct_answers.clone()),
                        choices: Some(
                            q.choices
                                .iter()
                                .zip(1_u32..)
                                .map(|(c, c_idx)| ApiChoice {
                                    id: Some(c.id.clone()),
                                    order: Some(c_idx),
                                    text: Some(c.text.clone()),
                                })
                                .collect(),
                        ),
                    })
                    .collect(),
            ),
        }
    }

    /// Maps from the backend shape.
    ///
    /// Missing ids get fresh local ids and a missing order becomes 0.
    #[must_use]
    pub fn from_api(quiz: Option<ApiQuiz>) -> Self {
        let Some(quiz) = quiz else {
            return Self::default();
        };
        Self {
            id: quiz.id,
            title: quiz.title.unwrap_or_default(),
            questions: quiz
                .questions
                .unwrap_or_default()
                .into_iter()
                .map(|q| Question {
                    id: q.id.unwrap_or_else(ItemId::generate),
                    order: Some(q.order.unwrap_or(0)),
                    kind: q.kind,
                    title: q.title.unwrap_or_default(),
                    text_parts: q.text_parts.unwrap_or_else(default_text_parts),
                    correct_answers: q.correct_answers.unwrap_or_default(),
                    choices: q
                        .choices
                        .unwrap_or_default()
                        .into_iter()
                        .map(|c| Choice {
                            id: c.id.unwrap_or_else(ItemId::generate),
                            text: c.text.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Quiz choice in backend shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiChoice {
    /// Choice id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    /// Position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Text.
    #[serde(default)]
    pub text: Option<String>,
}

/// Quiz question in backend shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiQuestion {
    /// Question id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    /// Position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Question kind.
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// Prompt.
    #[serde(default)]
    pub title: Option<String>,
    /// Text around the blanks.
    #[serde(default)]
    pub text_parts: Option<Vec<String>>,
    /// Correct answers.
    #[serde(default)]
    pub correct_answers: Option<Vec<String>>,
    /// Choices.
    #[serde(default)]
    pub choices: Option<Vec<ApiChoice>>,
}

/// Quiz in backend shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiQuiz {
    /// Quiz id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Questions.
    #[serde(default)]
    pub questions: Option<Vec<ApiQuestion>>,
}

impl ApiClient {
    /// Fetches the quiz of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn get_course_quiz(&self, course_id: &str) -> Result<Quiz> {
        let quiz: Option<ApiQuiz> = self.get(&quiz_path(course_id)).await?;
        Ok(Quiz::from_api(quiz))
    }

    /// Saves the whole quiz of a course.
    ///
    /// Tries `PUT` first and creates with `POST` when the backend answers
    /// 404, 405 or 409.
    ///
    /// # Errors
    ///
    /// Returns any other pipeline error.
    #[instrument(skip(self, quiz), fields(questions = quiz.questions.len()))]
    pub async fn upsert_course_quiz(&self, course_id: &str, quiz: &Quiz) -> Result<Quiz> {
        let path = quiz_path(course_id);
        let payload = quiz.to_api();
        match self.put::<Option<ApiQuiz>, _>(&path, &payload).await {
            Ok(saved) => Ok(Quiz::from_api(saved)),
            Err(e) if e.has_status(&CREATE_FALLBACK_STATUSES) => {
                debug!(status = ?e.status(), "Quiz not found for update; creating");
                let created: Option<ApiQuiz> = self.post(&path, &payload).await?;
                Ok(Quiz::from_api(created))
            }
            Err(e) => Err(e),
        }
    }
}
