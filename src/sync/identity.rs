//! Remote actor to local person resolution.
//!
//! The platform exposes a verified email in some contexts and only a
//! username in others for the same person, so resolution looks up by
//! `(email, name)` first and `(username, name)` second before creating a
//! new record — without the fallback, the same reviewer would get duplicate
//! identities. Resolved ids are cached per remote account id for the
//! lifetime of one sync run.

use std::collections::HashMap;

use crate::model::PersonId;
use crate::persistence::ReviewStore;
use crate::remote::RawAccount;

use super::error::SyncError;

/// Domain of email addresses synthesized for accounts without one.
pub const SYNTHETIC_EMAIL_DOMAIN: &str = "no_email.review";

/// Identity triple derived from a raw account, after fallback synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DerivedIdentity {
    name: String,
    email: String,
    username: String,
}

/// Resolves raw platform accounts to local person ids with a per-run cache.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: HashMap<i64, PersonId>,
}

impl IdentityResolver {
    /// Creates a resolver with an empty cache.
    ///
    /// The cache is scoped to one sync run; a fresh run re-resolves but the
    /// store lookups below guarantee it converges on the same person rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an account to a local person id.
    ///
    /// Repeated calls with the same remote account id return the cached id
    /// without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] when a store lookup or insert
    /// fails.
    pub fn resolve(
        &mut self,
        store: &dyn ReviewStore,
        account: &RawAccount,
    ) -> Result<PersonId, SyncError> {
        if let Some(cached) = self.cache.get(&account.account_id) {
            return Ok(*cached);
        }

        let identity = derive_identity(account);
        let person = match store.find_person_by_email(&identity.email, &identity.name)? {
            Some(existing) => existing,
            None => match store.find_person_by_username(&identity.username, &identity.name)? {
                Some(existing) => existing,
                None => {
                    tracing::debug!(
                        account_id = account.account_id,
                        username = identity.username.as_str(),
                        "creating person record for unseen account"
                    );
                    store.insert_person(&identity.name, &identity.email, &identity.username)?
                }
            },
        };

        self.cache.insert(account.account_id, person.id);
        Ok(person.id)
    }
}

/// Derives the `(name, email, username)` triple with fallback synthesis.
fn derive_identity(account: &RawAccount) -> DerivedIdentity {
    let username = account
        .username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            account
                .name
                .as_deref()
                .map(derive_username_from_name)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or_else(|| format!("user-{}", account.account_id));

    let name = account
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| username.clone(), ToOwned::to_owned);

    let email = account
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(
            || format!("{username}@{SYNTHETIC_EMAIL_DOMAIN}"),
            ToOwned::to_owned,
        );

    DerivedIdentity {
        name,
        email,
        username,
    }
}

fn derive_username_from_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{IdentityResolver, SYNTHETIC_EMAIL_DOMAIN, derive_identity};
    use crate::persistence::MemoryStore;
    use crate::remote::RawAccount;

    fn account(
        account_id: i64,
        name: Option<&str>,
        email: Option<&str>,
        username: Option<&str>,
    ) -> RawAccount {
        RawAccount {
            account_id,
            name: name.map(ToOwned::to_owned),
            email: email.map(ToOwned::to_owned),
            username: username.map(ToOwned::to_owned),
        }
    }

    #[rstest]
    #[case::all_present(
        account(1, Some("Mona Lisa"), Some("mona@example.org"), Some("mona")),
        ("Mona Lisa", "mona@example.org", "mona")
    )]
    #[case::email_synthesized(
        account(2, Some("Mona Lisa"), None, Some("mona")),
        ("Mona Lisa", "mona@no_email.review", "mona")
    )]
    #[case::username_derived_from_name(
        account(3, Some("Mona Lisa"), Some("mona@example.org"), None),
        ("Mona Lisa", "mona@example.org", "mona_lisa")
    )]
    #[case::name_falls_back_to_username(
        account(4, None, Some("mona@example.org"), Some("mona")),
        ("mona", "mona@example.org", "mona")
    )]
    #[case::everything_synthesized(
        account(5, None, None, None),
        ("user-5", "user-5@no_email.review", "user-5")
    )]
    fn derivation_synthesizes_missing_fields(
        #[case] raw: RawAccount,
        #[case] expected: (&str, &str, &str),
    ) {
        let identity = derive_identity(&raw);
        assert_eq!(identity.name, expected.0);
        assert_eq!(identity.email, expected.1);
        assert_eq!(identity.username, expected.2);
    }

    #[test]
    fn synthetic_domain_is_stable() {
        assert_eq!(SYNTHETIC_EMAIL_DOMAIN, "no_email.review");
    }

    #[test]
    fn same_email_and_name_under_different_ids_resolve_to_one_person() {
        let store = MemoryStore::new();
        let mut resolver = IdentityResolver::new();

        let first = resolver
            .resolve(&store, &account(10, Some("Mona Lisa"), Some("mona@example.org"), None))
            .expect("first resolution should succeed");
        let second = resolver
            .resolve(
                &store,
                &account(99, Some("Mona Lisa"), Some("mona@example.org"), Some("mona")),
            )
            .expect("second resolution should succeed");

        assert_eq!(first, second);
        assert_eq!(store.persons().len(), 1);
    }

    #[test]
    fn username_lookup_prevents_duplicates_when_email_is_withheld() {
        let store = MemoryStore::new();
        let mut resolver = IdentityResolver::new();

        let with_email = resolver
            .resolve(
                &store,
                &account(10, Some("Mona Lisa"), Some("mona@example.org"), Some("mona")),
            )
            .expect("resolution should succeed");

        // Same person, later payload without the verified email.
        let mut fresh_run = IdentityResolver::new();
        let without_email = fresh_run
            .resolve(&store, &account(10, Some("Mona Lisa"), None, Some("mona")))
            .expect("resolution should succeed");

        assert_eq!(with_email, without_email);
        assert_eq!(store.persons().len(), 1);
    }

    #[test]
    fn cache_short_circuits_repeated_resolution() {
        let store = MemoryStore::new();
        let mut resolver = IdentityResolver::new();
        let raw = account(10, Some("Mona Lisa"), Some("mona@example.org"), Some("mona"));

        let first = resolver.resolve(&store, &raw).expect("should resolve");
        let second = resolver.resolve(&store, &raw).expect("should resolve");

        assert_eq!(first, second);
        assert_eq!(store.persons().len(), 1);
    }
}
