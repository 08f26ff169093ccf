// 🧙 Naming Expert - Request → chart → prompt → candidates → history
// The only place the bazi core, the character library, the text generator
// and the store meet.

use crate::bazi::{self, BaziError, BaziResult, BaziSummary};
use crate::db;
use crate::library::CharacterLibrary;
use crate::llm::{self, GenerationOptions, LlmError, TextGenerator};
use crate::naming::{self, NameAnalysis, NameCandidate, NamingRequest, ValidationError};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Library characters offered to the model as references
pub const REFERENCE_CHAR_LIMIT: usize = 8;

#[derive(Debug, Error)]
pub enum ExpertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InvalidDate(#[from] BaziError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WuxingSummary {
    pub summary: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingOutcome {
    pub names: Vec<NameCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bazi: Option<BaziSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wuxing: Option<WuxingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
}

pub struct NamingExpert<G: TextGenerator> {
    generator: G,
    library: &'static CharacterLibrary,
}

impl<G: TextGenerator> NamingExpert<G> {
    pub fn new(generator: G, library: &'static CharacterLibrary) -> Self {
        NamingExpert { generator, library }
    }

    /// Library picks for the elements the chart lacks, minus disabled characters
    pub fn reference_chars(&self, request: &NamingRequest, chart: &BaziResult) -> Vec<String> {
        let lacking = &chart.profile.lacking_elements;
        if lacking.is_empty() {
            return Vec::new();
        }

        let disabled: &[String] = request
            .custom_options
            .as_ref()
            .map(|o| o.disabled_chars.as_slice())
            .unwrap_or_default();

        self.library
            .suggest(lacking, request.gender, request.style.library_tag(), usize::MAX)
            .into_iter()
            .filter(|e| !disabled.contains(&e.char))
            .take(REFERENCE_CHAR_LIMIT)
            .map(|e| e.char.clone())
            .collect()
    }

    /// `store` is optional so callers without a database still get names
    pub async fn generate_names(
        &self,
        store: Option<&Mutex<Connection>>,
        request: &NamingRequest,
    ) -> Result<NamingOutcome, ExpertError> {
        request.validate()?;

        let chart = request
            .birthday()
            .map(|birthday| bazi::compute_from_str(birthday, request.birth_hour))
            .transpose()?;

        let references = chart
            .as_ref()
            .map(|c| self.reference_chars(request, c))
            .unwrap_or_default();

        let prompt = naming::build_naming_prompt(request, chart.as_ref(), &references);
        debug!(surname = %request.surname.trim(), references = references.len(), "naming prompt built");

        let content = self.generator.generate(&prompt, &GenerationOptions::naming()).await?;
        let names = llm::parse_candidates(&content)?;
        info!(count = names.len(), has_chart = chart.is_some(), "names generated");

        let mut outcome = NamingOutcome {
            names,
            bazi: chart.as_ref().map(BaziResult::summary),
            wuxing: chart.as_ref().map(|c| WuxingSummary {
                summary: c.profile.summary_label.clone(),
                explanation: c.profile.explanation.clone(),
            }),
            history_id: None,
        };

        if let Some(store) = store {
            match self.persist_history(store, request, &outcome) {
                Ok(id) => outcome.history_id = Some(id),
                // The caller already paid for the generation; keep the names
                Err(e) => warn!(error = %e, "failed to save naming history"),
            }
        }

        Ok(outcome)
    }

    pub fn persist_history(
        &self,
        store: &Mutex<Connection>,
        request: &NamingRequest,
        outcome: &NamingOutcome,
    ) -> Result<String, ExpertError> {
        let mut params = serde_json::to_value(request).map_err(anyhow::Error::from)?;
        if let (Some(map), Some(chart)) = (params.as_object_mut(), &outcome.bazi) {
            map.insert("bazi".to_string(), serde_json::to_value(chart).map_err(anyhow::Error::from)?);
        }

        let result = serde_json::json!({
            "names": outcome.names,
            "wuxing": outcome.wuxing,
        });

        let conn = store
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        let id = db::insert_history(&conn, request.openid.as_deref(), &params, &result)?;
        Ok(id)
    }

    pub async fn analyze_name(&self, full_name: &str) -> Result<NameAnalysis, ExpertError> {
        let name = naming::validate_full_name(full_name)?;

        let prompt = naming::build_analysis_prompt(name);
        let content = self.generator.generate(&prompt, &GenerationOptions::analysis()).await?;
        let analysis = llm::parse_analysis(&content)?;

        info!(name = %name, score = analysis.overall_score, "name analysed");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{CustomOptions, Gender, NamingStyle};
    use async_trait::async_trait;
    use chrono::Utc;

    const NAMES_REPLY: &str = r#"```json
{"names":[{"fullName":"李锦","givenName":"锦","pinyin":"lǐ jǐn","wuxing":"金","meaning":"锦绣","analysis":"补金"}]}
```"#;

    struct StubGenerator {
        reply: Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn replying(reply: &str) -> Self {
            StubGenerator {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(code: u16) -> Self {
            StubGenerator {
                reply: Err(code),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(code) => Err(LlmError::Status {
                    code: *code,
                    body: "upstream down".to_string(),
                }),
            }
        }
    }

    fn expert(generator: StubGenerator) -> NamingExpert<StubGenerator> {
        NamingExpert::new(generator, CharacterLibrary::builtin().unwrap())
    }

    fn store() -> Mutex<Connection> {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        Mutex::new(conn)
    }

    fn request() -> NamingRequest {
        NamingRequest {
            surname: "李".to_string(),
            gender: Gender::Female,
            style: NamingStyle::PoeticClassic,
            birthday: Some("2025-12-28".to_string()),
            birth_hour: Some(10),
            openid: Some("openid-1".to_string()),
            custom_options: None,
        }
    }

    #[tokio::test]
    async fn test_generate_names_with_chart() {
        let expert = expert(StubGenerator::replying(NAMES_REPLY));
        let store = store();

        let outcome = expert.generate_names(Some(&store), &request()).await.unwrap();

        assert_eq!(outcome.names[0].full_name, "李锦");
        let chart = outcome.bazi.as_ref().unwrap();
        assert_eq!(chart.year, "乙巳");
        assert_eq!(chart.hour, "己巳");
        assert_eq!(outcome.wuxing.as_ref().unwrap().summary, "缺金");
        assert!(outcome.history_id.is_some());

        let prompts = expert.generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("八字：乙巳 丙亥 甲寅 己巳"));
        assert!(prompts[0].contains("可参考字库用字："));

        let conn = store.lock().unwrap();
        let page = db::list_history(&conn, "openid-1", 1, 20, Utc::now()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].params["bazi"]["day"], "甲寅");
        assert_eq!(page.records[0].result["names"][0]["givenName"], "锦");
    }

    #[tokio::test]
    async fn test_generate_names_without_birthday() {
        let expert = expert(StubGenerator::replying(NAMES_REPLY));
        let mut req = request();
        req.birthday = Some("  ".to_string());
        req.birth_hour = None;

        let outcome = expert.generate_names(None, &req).await.unwrap();

        assert!(outcome.bazi.is_none());
        assert!(outcome.wuxing.is_none());
        assert!(outcome.history_id.is_none());
        let prompts = expert.generator.prompts.lock().unwrap();
        assert!(!prompts[0].contains("八字"));
    }

    #[tokio::test]
    async fn test_invalid_date_skips_generation() {
        let expert = expert(StubGenerator::replying(NAMES_REPLY));
        let mut req = request();
        req.birthday = Some("2025-02-30".to_string());

        let result = expert.generate_names(None, &req).await;

        assert!(matches!(result, Err(ExpertError::InvalidDate(_))));
        assert_eq!(expert.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_error() {
        let expert = expert(StubGenerator::replying(NAMES_REPLY));
        let mut req = request();
        req.surname = " ".to_string();

        let result = expert.generate_names(None, &req).await;
        assert!(matches!(result, Err(ExpertError::Validation(ValidationError::MissingSurname))));
    }

    #[tokio::test]
    async fn test_upstream_failure_saves_nothing() {
        let expert = expert(StubGenerator::failing(503));
        let store = store();

        let result = expert.generate_names(Some(&store), &request()).await;

        assert!(matches!(result, Err(ExpertError::Llm(LlmError::Status { code: 503, .. }))));
        let conn = store.lock().unwrap();
        assert_eq!(db::list_history(&conn, "openid-1", 1, 20, Utc::now()).unwrap().total, 0);
    }

    #[test]
    fn test_reference_chars_respect_disabled() {
        let expert = expert(StubGenerator::replying(NAMES_REPLY));
        let mut req = request();
        let chart = bazi::compute_from_str("2025-12-28", Some(10)).unwrap();

        let refs = expert.reference_chars(&req, &chart);
        assert!(!refs.is_empty());
        assert!(refs.len() <= REFERENCE_CHAR_LIMIT);

        let banned = refs[0].clone();
        req.custom_options = Some(CustomOptions {
            disabled_chars: vec![banned.clone()],
            ..Default::default()
        });
        assert!(!expert.reference_chars(&req, &chart).contains(&banned));
    }

    #[tokio::test]
    async fn test_analyze_name() {
        let reply = r#"{
            "fullName": "李瑞",
            "chars": [{"char":"瑞","pinyin":"ruì","strokes":13,"wuxing":"金","radical":"王","meaning":"吉祥"}],
            "pronunciation": {"pinyin":"lǐ ruì","tones":"三声 四声","harmony":"顺口","score":88},
            "structure": {"totalStrokes":20,"balance":"均衡","score":85},
            "meaning": {"overall":"吉祥如意","cultural":"祥瑞","score":90},
            "wuxing": {"elements":["木","金"],"analysis":"金木相克","score":70},
            "overallScore": 84
        }"#;
        let expert = expert(StubGenerator::replying(reply));

        let analysis = expert.analyze_name(" 李瑞 ").await.unwrap();
        assert_eq!(analysis.overall_score, 84);
        assert!(analysis.suggestions.is_empty());

        let result = expert.analyze_name("李").await;
        assert!(matches!(result, Err(ExpertError::Validation(ValidationError::FullNameTooShort))));
    }
}
