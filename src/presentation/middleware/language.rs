//! Language Negotiation
//!
//! Server side: resolve the caller's language from metadata and store it in
//! the request extensions. Client side: advertise a language on outgoing
//! calls.

use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::config::I18nSettings;
use crate::i18n::{match_accept_language, Language};
use crate::shared::metadata_value;

/// Metadata keys consulted when the configured header is absent
const FALLBACK_KEYS: [&str; 2] = ["language", "lang"];

/// Resolves the request language and inserts it as a [`Language`] extension.
#[derive(Debug, Clone)]
pub struct LanguageInterceptor {
    header: String,
    default_language: Language,
}

impl LanguageInterceptor {
    pub fn new(header: impl Into<String>, default_language: Language) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
            default_language,
        }
    }

    pub fn from_settings(settings: &I18nSettings) -> Self {
        Self::new(settings.header.clone(), settings.default_language)
    }

    fn resolve<T>(&self, request: &Request<T>) -> Language {
        let metadata = request.metadata();
        std::iter::once(self.header.as_str())
            .chain(FALLBACK_KEYS)
            .find_map(|key| metadata_value(metadata, key))
            .and_then(match_accept_language)
            .unwrap_or(self.default_language)
    }
}

impl Default for LanguageInterceptor {
    fn default() -> Self {
        Self::from_settings(&I18nSettings::default())
    }
}

impl Interceptor for LanguageInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let language = self.resolve(&request);
        request.extensions_mut().insert(language);
        Ok(request)
    }
}

/// The language stored by [`LanguageInterceptor`], if it ran.
pub fn language_from_extensions(extensions: &tonic::Extensions) -> Option<Language> {
    extensions.get::<Language>().copied()
}

/// The request's language, or the default language when none was resolved.
pub fn request_language<T>(request: &Request<T>) -> Language {
    language_from_extensions(request.extensions()).unwrap_or_default()
}

/// Sets `accept-language` on outgoing calls that do not carry one.
#[derive(Debug, Clone, Copy)]
pub struct AcceptLanguageInterceptor {
    language: Language,
}

impl AcceptLanguageInterceptor {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl Interceptor for AcceptLanguageInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        if !metadata.contains_key("accept-language") {
            metadata.insert(
                "accept-language",
                MetadataValue::from_static(self.language.code()),
            );
        }
        Ok(request)
    }
}
