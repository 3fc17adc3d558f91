use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::model::{ActionEvent, ActionKind, normalize_email};

/// Title of the multi-select question holding the race options.
pub const RACE_QUESTION_TITLE: &str = "Race Dates";

const EMAIL_QUESTION: &str = "email";
const NAME_QUESTION: &str = "name";
const ACTION_QUESTION: &str = "action";

/// Where decoded signup intent comes from, and where the refreshed option
/// list is published back to.
#[async_trait]
pub trait ActionSource: Send + Sync {
    /// Events submitted strictly after `since`, ascending by submission time.
    async fn list_actions_since(
        &self,
        form_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionEvent>, SyncError>;

    /// Replace the form's selectable race options.
    async fn publish_options(&self, form_code: &str, labels: &[String]) -> Result<(), SyncError>;
}

/// One question on the form.
#[derive(Debug, Clone, Deserialize)]
pub struct FormItem {
    pub id: String,
    pub title: String,
}

/// One raw submission, answers keyed by question id.
#[derive(Debug, Clone, Deserialize)]
pub struct FormResponse {
    pub submit_time: DateTime<Utc>,
    pub answers: HashMap<String, Vec<String>>,
}

/// Decode raw submissions into an ordered event sequence. Questions are
/// matched by lowercased title; the race multi-select fans out into one event
/// per selected label. A response without an email, name, action, or race
/// answer, or with an unrecognized action, fails the whole batch.
pub fn decode_actions(
    items: &[FormItem],
    mut responses: Vec<FormResponse>,
) -> Result<Vec<ActionEvent>, SyncError> {
    let mut questions: HashMap<String, &str> = HashMap::new();
    let mut race_item: Option<&FormItem> = None;
    for item in items {
        questions.insert(item.title.to_lowercase(), item.id.as_str());
        if item.title == RACE_QUESTION_TITLE {
            race_item = Some(item);
        }
    }
    let race_item = race_item
        .ok_or_else(|| SyncError::message(format!("form has no '{RACE_QUESTION_TITLE}' item")))?;

    // sort_by_key is stable, so equal timestamps keep their input order
    responses.sort_by_key(|response| response.submit_time);

    let mut events = Vec::new();
    for response in &responses {
        let email = normalize_email(first_answer(response, &questions, EMAIL_QUESTION)?);
        let name = first_answer(response, &questions, NAME_QUESTION)?
            .trim()
            .to_string();
        let action_text = first_answer(response, &questions, ACTION_QUESTION)?;
        let kind = ActionKind::parse(action_text)
            .ok_or_else(|| SyncError::UnknownAction(action_text.trim().to_string()))?;

        let selections = response
            .answers
            .get(&race_item.id)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| SyncError::MissingField(RACE_QUESTION_TITLE.to_lowercase()))?;

        for label in selections {
            events.push(ActionEvent {
                email: email.clone(),
                name: name.clone(),
                race_label: label.clone(),
                kind,
                submitted_at: response.submit_time,
            });
        }
    }

    Ok(events)
}

fn first_answer<'a>(
    response: &'a FormResponse,
    questions: &HashMap<String, &str>,
    title: &str,
) -> Result<&'a str, SyncError> {
    questions
        .get(title)
        .and_then(|id| response.answers.get(*id))
        .and_then(|values| values.first())
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SyncError::MissingField(title.to_string()))
}

/// HTTP-backed [`ActionSource`].
#[derive(Debug, Clone)]
pub struct FormsClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl FormsClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> FormsClient {
        FormsClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_form(&self, form_code: &str) -> Result<Vec<FormItem>, SyncError> {
        #[derive(Deserialize)]
        struct FormEnvelope {
            items: Vec<FormItem>,
        }

        let url = format!("{}/v1/forms/{}", self.base_url, form_code);
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "forms",
                format!("GET {} responded with {}", url, response.status()),
            ));
        }
        let body: FormEnvelope = response.json().await?;
        Ok(body.items)
    }

    async fn fetch_responses(
        &self,
        form_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FormResponse>, SyncError> {
        #[derive(Deserialize)]
        struct ResponsesEnvelope {
            responses: Vec<FormResponse>,
        }

        let url = format!("{}/v1/forms/{}/responses", self.base_url, form_code);
        let response = self
            .authorize(
                self.client
                    .get(&url)
                    .query(&[("since", since.to_rfc3339())]),
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "forms",
                format!("GET {} responded with {}", url, response.status()),
            ));
        }
        let body: ResponsesEnvelope = response.json().await?;
        Ok(body.responses)
    }
}

#[async_trait]
impl ActionSource for FormsClient {
    async fn list_actions_since(
        &self,
        form_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionEvent>, SyncError> {
        let items = self.fetch_form(form_code).await?;
        let responses = self.fetch_responses(form_code, since).await?;
        decode_actions(&items, responses)
    }

    async fn publish_options(&self, form_code: &str, labels: &[String]) -> Result<(), SyncError> {
        #[derive(Serialize)]
        struct OptionsRequest<'a> {
            item_id: &'a str,
            options: &'a [String],
        }

        let items = self.fetch_form(form_code).await?;
        let race_item = items
            .iter()
            .find(|item| item.title == RACE_QUESTION_TITLE)
            .ok_or_else(|| {
                SyncError::message(format!("form has no '{RACE_QUESTION_TITLE}' item"))
            })?;

        let url = format!("{}/v1/forms/{}/options", self.base_url, form_code);
        let response = self
            .authorize(self.client.put(&url).json(&OptionsRequest {
                item_id: &race_item.id,
                options: labels,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "forms",
                format!("PUT {} responded with {}", url, response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_items() -> Vec<FormItem> {
        vec![
            FormItem {
                id: "q-email".into(),
                title: "Email".into(),
            },
            FormItem {
                id: "q-name".into(),
                title: "Name".into(),
            },
            FormItem {
                id: "q-action".into(),
                title: "Action".into(),
            },
            FormItem {
                id: "q-races".into(),
                title: RACE_QUESTION_TITLE.into(),
            },
        ]
    }

    fn response(minute: u32, email: &str, action: &str, races: &[&str]) -> FormResponse {
        let mut answers = HashMap::new();
        answers.insert("q-email".to_string(), vec![email.to_string()]);
        answers.insert("q-name".to_string(), vec!["Test User".to_string()]);
        answers.insert("q-action".to_string(), vec![action.to_string()]);
        answers.insert(
            "q-races".to_string(),
            races.iter().map(|r| r.to_string()).collect(),
        );
        FormResponse {
            submit_time: Utc.with_ymd_and_hms(2026, 8, 1, 12, minute, 0).unwrap(),
            answers,
        }
    }

    #[test]
    fn multi_select_fans_out_sharing_user_and_action() {
        let events = decode_actions(
            &sample_items(),
            vec![response(
                0,
                "alice@example.com",
                "signup",
                &["Spring Cup - 2026-09-01", "Time Trial - 2026-09-08"],
            )],
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.email == "alice@example.com"));
        assert!(events.iter().all(|e| e.kind == ActionKind::Signup));
        assert_eq!(events[0].race_label, "Spring Cup - 2026-09-01");
        assert_eq!(events[1].race_label, "Time Trial - 2026-09-08");
    }

    #[test]
    fn responses_are_ordered_by_submission_time() {
        let events = decode_actions(
            &sample_items(),
            vec![
                response(5, "bob@example.com", "signup", &["Spring Cup - x"]),
                response(1, "alice@example.com", "signup", &["Spring Cup - x"]),
            ],
        )
        .unwrap();

        assert_eq!(events[0].email, "alice@example.com");
        assert_eq!(events[1].email, "bob@example.com");
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let events = decode_actions(
            &sample_items(),
            vec![
                response(3, "first@example.com", "signup", &["Spring Cup - x"]),
                response(3, "second@example.com", "signup", &["Spring Cup - x"]),
            ],
        )
        .unwrap();

        assert_eq!(events[0].email, "first@example.com");
        assert_eq!(events[1].email, "second@example.com");
    }

    #[test]
    fn email_is_normalized_and_questions_match_case_insensitively() {
        let events = decode_actions(
            &sample_items(),
            vec![response(0, "  Alice@Example.COM ", "SIGNUP", &["Spring Cup - x"])],
        )
        .unwrap();

        assert_eq!(events[0].email, "alice@example.com");
        assert_eq!(events[0].kind, ActionKind::Signup);
    }

    #[test]
    fn missing_email_fails_the_batch() {
        let mut bad = response(0, "alice@example.com", "signup", &["Spring Cup - x"]);
        bad.answers.remove("q-email");

        let err = decode_actions(&sample_items(), vec![bad]).unwrap_err();
        assert!(matches!(err, SyncError::MissingField(field) if field == "email"));
    }

    #[test]
    fn blank_answers_count_as_missing() {
        let err = decode_actions(
            &sample_items(),
            vec![response(0, "   ", "signup", &["Spring Cup - x"])],
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::MissingField(field) if field == "email"));
    }

    #[test]
    fn unknown_action_fails_the_batch() {
        let err = decode_actions(
            &sample_items(),
            vec![response(0, "alice@example.com", "withdraw", &["Spring Cup - x"])],
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::UnknownAction(action) if action == "withdraw"));
    }

    #[test]
    fn missing_race_selection_fails_the_batch() {
        let mut bad = response(0, "alice@example.com", "signup", &[]);
        bad.answers.remove("q-races");

        let err = decode_actions(&sample_items(), vec![bad]).unwrap_err();
        assert!(matches!(err, SyncError::MissingField(field) if field == "race dates"));
    }

    #[test]
    fn form_without_a_race_item_is_rejected() {
        let items = vec![FormItem {
            id: "q-email".into(),
            title: "Email".into(),
        }];
        assert!(decode_actions(&items, vec![]).is_err());
    }
}
