//! Project resolver contract and the built-in orphan resolver.
//!
//! The core consumes exactly two queries from whatever project system is
//! plugged in: which languages own a path, and which project claims it. How
//! the answers are computed (build-system evaluation, heuristics) is not
//! this crate's business. The dispatcher snapshots the answers once per
//! dispatch, so implementations only need to be stable between two calls,
//! not forever.

use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use junction_documents::LanguageLookup;

/// Narrow query surface onto the workspace's project system(s).
#[cfg_attr(test, automock)]
pub trait ProjectResolver: Send + Sync {
    /// Languages owning `path`, in precedence order.
    ///
    /// Never empty: paths no project claims resolve to the configured
    /// orphan language. A path may be owned by more than one language
    /// layer (a base language plus a generated-overlay language).
    fn owning_languages(&self, path: &Path) -> Vec<String>;

    /// Project claiming `path`, when any does.
    fn owning_project(&self, path: &Path) -> Option<String>;
}

/// Resolver for workspaces with no real project system attached.
///
/// Every path belongs to the configured default language and no project.
#[derive(Debug, Clone)]
pub struct OrphanResolver {
    default_language: String,
}

impl OrphanResolver {
    /// Creates a resolver answering with `default_language` for every path.
    #[must_use]
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }
}

impl ProjectResolver for OrphanResolver {
    fn owning_languages(&self, _path: &Path) -> Vec<String> {
        vec![self.default_language.clone()]
    }

    fn owning_project(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Adapts a [`ProjectResolver`] to the buffer pipeline's language lookup.
///
/// The pipeline only needs the primary owning language; the fallback guards
/// against resolvers that violate the never-empty contract.
pub struct ResolverLanguageLookup {
    resolver: Arc<dyn ProjectResolver>,
    fallback: String,
}

impl ResolverLanguageLookup {
    /// Creates a lookup backed by `resolver`, defaulting to `fallback`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ProjectResolver>, fallback: impl Into<String>) -> Self {
        Self {
            resolver,
            fallback: fallback.into(),
        }
    }
}

impl LanguageLookup for ResolverLanguageLookup {
    fn owning_language(&self, path: &Path) -> String {
        self.resolver
            .owning_languages(path)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_resolver_claims_every_path() {
        let resolver = OrphanResolver::new("plaintext");
        let path = Path::new("/ws/unknown.xyz");
        assert_eq!(resolver.owning_languages(path), ["plaintext"]);
        assert_eq!(resolver.owning_project(path), None);
    }

    #[test]
    fn lookup_takes_the_primary_language() {
        let mut resolver = MockProjectResolver::new();
        resolver
            .expect_owning_languages()
            .returning(|_| vec!["csharp".to_owned(), "generated-overlay".to_owned()]);
        let lookup = ResolverLanguageLookup::new(Arc::new(resolver), "plaintext");
        assert_eq!(lookup.owning_language(Path::new("/ws/a.cs")), "csharp");
    }

    #[test]
    fn lookup_falls_back_when_the_contract_is_violated() {
        let mut resolver = MockProjectResolver::new();
        resolver.expect_owning_languages().returning(|_| Vec::new());
        let lookup = ResolverLanguageLookup::new(Arc::new(resolver), "plaintext");
        assert_eq!(lookup.owning_language(Path::new("/ws/a.cs")), "plaintext");
    }
}
