//! Named serverless functions behind the backend (training, generation,
//! prompt tooling, purchases).

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::error::{AppError, AppResult, ErrorKind};
use crate::model::{GenerationId, TrainingId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    Training {
        steps: u32,
    },
    Generate {
        training_id: TrainingId,
        prompt: String,
        parent_generation_id: Option<GenerationId>,
    },
    DeleteUser,
    AnalyzeSelfie {
        file_id: String,
    },
    GeneratePersonDescription {
        training_id: TrainingId,
    },
    SurpriseMe,
    Translate {
        prompt: String,
    },
    EnhancePrompt {
        prompt: String,
    },
    PictureToPrompt {
        url: String,
    },
    PromoCode {
        promo_code: String,
    },
    SlackError {
        error: String,
    },
    VerifyAndroidPurchase {
        product_id: String,
        purchase_token: String,
    },
    VerifyIosPurchase {
        product_id: String,
        receipt: String,
        transaction_id: String,
    },
}

impl FunctionCall {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Training { .. } => "training",
            Self::Generate { .. } => "generate",
            Self::DeleteUser => "delete-user",
            Self::AnalyzeSelfie { .. } => "analyze-selfie",
            Self::GeneratePersonDescription { .. } => "generate-person-description",
            Self::SurpriseMe => "surprise-me",
            Self::Translate { .. } => "translate",
            Self::EnhancePrompt { .. } => "enhance-prompt",
            Self::PictureToPrompt { .. } => "picture-to-prompt",
            Self::PromoCode { .. } => "promo-code",
            Self::SlackError { .. } => "slack-error",
            Self::VerifyAndroidPurchase { .. } => "verify-android-purchase",
            Self::VerifyIosPurchase { .. } => "verify-ios-purchase",
        }
    }

    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Training { steps } => json!({ "steps": steps }),
            Self::Generate {
                training_id,
                prompt,
                parent_generation_id,
            } => json!({
                "training_id": training_id,
                "prompt": prompt,
                "parent_generation_id": parent_generation_id,
            }),
            Self::DeleteUser | Self::SurpriseMe => json!({}),
            Self::AnalyzeSelfie { file_id } => json!({ "file_id": file_id }),
            Self::GeneratePersonDescription { training_id } => {
                json!({ "training_id": training_id })
            }
            Self::Translate { prompt } | Self::EnhancePrompt { prompt } => {
                json!({ "prompt": prompt })
            }
            Self::PictureToPrompt { url } => json!({ "url": url }),
            Self::PromoCode { promo_code } => json!({ "promo_code": promo_code }),
            Self::SlackError { error } => json!({ "error": error }),
            Self::VerifyAndroidPurchase {
                product_id,
                purchase_token,
            } => json!({
                "product_id": product_id,
                "purchase_token": purchase_token,
            }),
            Self::VerifyIosPurchase {
                product_id,
                receipt,
                transaction_id,
            } => json!({
                "product_id": product_id,
                "receipt": receipt,
                "transaction_id": transaction_id,
            }),
        }
    }
}

/// One request/response round trip to a named function.
#[async_trait::async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, call: &FunctionCall) -> AppResult<Bytes>;
}

pub struct RemoteGenerationGateway<I: FunctionInvoker> {
    invoker: I,
}

impl<I: FunctionInvoker> RemoteGenerationGateway<I> {
    pub fn new(invoker: I) -> Self {
        Self { invoker }
    }

    #[must_use]
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    async fn call(&self, call: FunctionCall) -> AppResult<Bytes> {
        info!(function = call.name(), "invoking function");
        self.invoker.invoke(&call).await
    }

    async fn call_text(&self, call: FunctionCall) -> AppResult<String> {
        let body = self.call(call).await?;
        decode_text(&body)
    }

    async fn call_flag(&self, call: FunctionCall) -> AppResult<bool> {
        let body = self.call(call).await?;
        Ok(serde_json::from_slice::<bool>(&body)?)
    }

    #[instrument(skip(self))]
    pub async fn train_ai_model(&self, steps: u32) -> AppResult<()> {
        self.call(FunctionCall::Training { steps }).await.map(drop)
    }

    #[instrument(skip(self, prompt))]
    pub async fn generate_photo(
        &self,
        training_id: &TrainingId,
        prompt: &str,
        parent_generation_id: Option<&GenerationId>,
    ) -> AppResult<()> {
        self.call(FunctionCall::Generate {
            training_id: training_id.clone(),
            prompt: prompt.to_string(),
            parent_generation_id: parent_generation_id.cloned(),
        })
        .await
        .map(drop)
    }

    pub async fn delete_user(&self) -> AppResult<()> {
        self.call(FunctionCall::DeleteUser).await.map(drop)
    }

    #[instrument(skip(self))]
    pub async fn analyze_photo(&self, file_id: &str) -> AppResult<()> {
        self.call(FunctionCall::AnalyzeSelfie {
            file_id: file_id.to_string(),
        })
        .await
        .map(drop)
    }

    #[instrument(skip(self))]
    pub async fn generate_person_description(&self, training_id: &TrainingId) -> AppResult<()> {
        self.call(FunctionCall::GeneratePersonDescription {
            training_id: training_id.clone(),
        })
        .await
        .map(drop)
    }

    pub async fn surprise_me(&self) -> AppResult<String> {
        self.call_text(FunctionCall::SurpriseMe).await
    }

    pub async fn translate(&self, prompt: &str) -> AppResult<String> {
        self.call_text(FunctionCall::Translate {
            prompt: prompt.to_string(),
        })
        .await
    }

    pub async fn enhance_prompt(&self, prompt: &str) -> AppResult<String> {
        self.call_text(FunctionCall::EnhancePrompt {
            prompt: prompt.to_string(),
        })
        .await
    }

    pub async fn picture_to_prompt(&self, url: &str) -> AppResult<String> {
        self.call_text(FunctionCall::PictureToPrompt {
            url: url.to_string(),
        })
        .await
    }

    pub async fn apply_promo_code(&self, promo_code: &str) -> AppResult<bool> {
        self.call_flag(FunctionCall::PromoCode {
            promo_code: promo_code.to_string(),
        })
        .await
    }

    pub async fn send_slack_error(&self, error: &str) -> AppResult<()> {
        self.call(FunctionCall::SlackError {
            error: error.to_string(),
        })
        .await
        .map(drop)
    }

    #[instrument(skip(self, purchase_token))]
    pub async fn verify_android_purchase(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> AppResult<bool> {
        self.call_flag(FunctionCall::VerifyAndroidPurchase {
            product_id: product_id.to_string(),
            purchase_token: purchase_token.to_string(),
        })
        .await
    }

    #[instrument(skip(self, receipt))]
    pub async fn verify_ios_purchase(
        &self,
        product_id: &str,
        receipt: &str,
        transaction_id: &str,
    ) -> AppResult<bool> {
        self.call_flag(FunctionCall::VerifyIosPurchase {
            product_id: product_id.to_string(),
            receipt: receipt.to_string(),
            transaction_id: transaction_id.to_string(),
        })
        .await
    }
}

// Text functions answer with a JSON string, some older deployments with raw text.
fn decode_text(body: &[u8]) -> AppResult<String> {
    if let Ok(text) = serde_json::from_slice::<String>(body) {
        return Ok(text);
    }
    String::from_utf8(body.to_vec()).map_err(|e| {
        AppError::new(ErrorKind::Deserialization, "Response is not valid text")
            .with_internal(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedInvoker {
        calls: Mutex<Vec<FunctionCall>>,
        response: AppResult<Bytes>,
    }

    impl ScriptedInvoker {
        fn ok(body: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response: Ok(Bytes::from_static(body.as_bytes())),
            }
        }

        fn failing(error: AppError) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response: Err(error),
            }
        }
    }

    #[async_trait::async_trait]
    impl FunctionInvoker for ScriptedInvoker {
        async fn invoke(&self, call: &FunctionCall) -> AppResult<Bytes> {
            self.calls.lock().unwrap().push(call.clone());
            self.response.clone()
        }
    }

    #[test]
    fn test_generate_body_keeps_null_parent() {
        let call = FunctionCall::Generate {
            training_id: TrainingId::new("tr-1"),
            prompt: "portrait".into(),
            parent_generation_id: None,
        };
        assert_eq!(call.name(), "generate");
        assert_eq!(
            call.body(),
            json!({"training_id": "tr-1", "prompt": "portrait", "parent_generation_id": null})
        );
    }

    #[test]
    fn test_purchase_bodies() {
        let ios = FunctionCall::VerifyIosPurchase {
            product_id: "credits_10".into(),
            receipt: "r".into(),
            transaction_id: "t".into(),
        };
        assert_eq!(ios.name(), "verify-ios-purchase");
        assert_eq!(
            ios.body(),
            json!({"product_id": "credits_10", "receipt": "r", "transaction_id": "t"})
        );
    }

    #[tokio::test]
    async fn test_text_function_decodes_json_string() {
        let gateway = RemoteGenerationGateway::new(ScriptedInvoker::ok("\"a cat, studio light\""));
        let enhanced = gateway.enhance_prompt("a cat").await.unwrap();
        assert_eq!(enhanced, "a cat, studio light");
        assert_eq!(
            gateway.invoker().calls.lock().unwrap()[0],
            FunctionCall::EnhancePrompt { prompt: "a cat".into() }
        );
    }

    #[tokio::test]
    async fn test_text_function_accepts_raw_text() {
        let gateway = RemoteGenerationGateway::new(ScriptedInvoker::ok("un chat"));
        assert_eq!(gateway.translate("a cat").await.unwrap(), "un chat");
    }

    #[tokio::test]
    async fn test_flag_function_rejects_garbage() {
        let gateway = RemoteGenerationGateway::new(ScriptedInvoker::ok("maybe"));
        let err = gateway.apply_promo_code("FREE").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Deserialization);
    }

    #[tokio::test]
    async fn test_flag_function_reads_bool() {
        let gateway = RemoteGenerationGateway::new(ScriptedInvoker::ok("true"));
        assert!(gateway.verify_android_purchase("p", "token").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_propagates_once() {
        let gateway = RemoteGenerationGateway::new(ScriptedInvoker::failing(AppError::new(
            ErrorKind::Network,
            "offline",
        )));
        let err = gateway.train_ai_model(1200).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(gateway.invoker().calls.lock().unwrap().len(), 1);
    }
}
