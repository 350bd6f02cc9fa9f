use deepsearch_core::Error;
use serde::Serialize;

pub(crate) const SCHEMA_VERSION: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotConfigured,
    NotSupported,
    FetchFailed,
    SearchFailed,
    ModelFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotConfigured => "not_configured",
            Self::NotSupported => "not_supported",
            Self::FetchFailed => "fetch_failed",
            Self::SearchFailed => "search_failed",
            Self::ModelFailed => "model_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::FetchFailed | Self::SearchFailed | Self::ModelFailed => true,
            // Configuration + invalid input are not retryable without changing something.
            Self::NotConfigured
            | Self::NotSupported
            | Self::InvalidParams
            | Self::InvalidUrl
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => "Check the required arguments.",
            Self::InvalidUrl => "Pass an absolute http(s) URL like https://example.com.",
            Self::NotConfigured => {
                "Set DEEPSEARCH_LLM_API_KEY (or DEEPSEARCH_LLM_BASE_URL) and one search provider key; see `deepsearch doctor`."
            }
            Self::NotSupported => "See `deepsearch --help` for allowed values.",
            Self::FetchFailed => "The page could not be fetched; retry later or try a different URL.",
            Self::SearchFailed => "The search provider failed; retry later or switch providers.",
            Self::ModelFailed => "The language model endpoint failed; retry later or check DEEPSEARCH_LLM_BASE_URL.",
            Self::UnexpectedError => "",
        }
    }
}

impl From<&Error> for ErrorCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::InvalidUrl(_) => Self::InvalidUrl,
            Error::Fetch(_) => Self::FetchFailed,
            Error::Search(_) => Self::SearchFailed,
            Error::Llm(_) => Self::ModelFailed,
            Error::NotConfigured(_) => Self::NotConfigured,
            Error::NotSupported(_) => Self::NotSupported,
            Error::PlanParse(_) => Self::UnexpectedError,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub(crate) fn error_obj(code: ErrorCode, message: impl ToString) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: &'static str,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: code.hint(),
        retryable: code.retryable(),
    };
    serde_json::to_value(&e).unwrap_or_else(|_| {
        serde_json::json!({
            "code": e.code,
            "message": e.message,
            "hint": e.hint,
            "retryable": e.retryable,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_obj_has_stable_keys() {
        let v = error_obj(ErrorCode::from(&Error::InvalidUrl("x".into())), "bad url");
        assert_eq!(v["code"], "invalid_url");
        assert_eq!(v["message"], "bad url");
        assert_eq!(v["retryable"], false);
        assert!(v["hint"].as_str().unwrap().contains("http"));
    }

    #[test]
    fn transport_failures_are_retryable() {
        for e in [
            Error::Fetch("x".into()),
            Error::Search("x".into()),
            Error::Llm("x".into()),
        ] {
            assert!(ErrorCode::from(&e).retryable(), "{e}");
        }
        assert!(!ErrorCode::from(&Error::NotConfigured("x".into())).retryable());
    }

    #[test]
    fn envelope_fields_are_added() {
        let mut v = serde_json::json!({"ok": true});
        add_envelope_fields(&mut v, "fetch", 12);
        assert_eq!(v["schema_version"], SCHEMA_VERSION);
        assert_eq!(v["kind"], "fetch");
        assert_eq!(v["elapsed_ms"], 12);
    }
}
