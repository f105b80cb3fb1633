//! # CAS account resolution
//!
//! CAS logins are recycled from one school year to the next, so an account
//! is keyed on `login#homedir` instead. When the email given by CAS already
//! belongs to another account, that account is replaced only if it looks
//! abandoned; otherwise the login is refused.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{CasAccount, User};
use crate::traits::{AccountRepo, CasIdentity};

/// Accounts unused for this many days may be replaced by a new CAS account.
pub const STALE_ACCOUNT_DAYS: i64 = 180;

pub fn clean_cas_login(login: &str) -> String {
    login.trim().to_lowercase()
}

pub fn cas_unique_id(login: &str, home_directory: &str) -> String {
    format!("{login}#{home_directory}")
}

/// What to do with a CAS identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResolution {
    /// No account uses this email
    Create,
    /// The account already belongs to this CAS identity
    LogIn(User),
    /// The account with this email is stale and is replaced by a new one
    Replace(User),
    Reject(String),
}

/// Decides how to treat a CAS identity given the account currently holding
/// its email, if any.
pub fn resolve_cas_login(
    existing: Option<(User, Option<CasAccount>)>,
    unique_id: &str,
    now: DateTime<Utc>,
) -> CasResolution {
    let Some((user, cas_account)) = existing else {
        return CasResolution::Create;
    };
    if cas_account.as_ref().is_some_and(|account| account.unique_id == unique_id) {
        return CasResolution::LogIn(user);
    }

    let stale = user.last_login.map_or(true, |last| now - last >= TimeDelta::days(STALE_ACCOUNT_DAYS));
    if stale && !user.is_superuser {
        return CasResolution::Replace(user);
    }

    let reason = if cas_account.is_none() {
        format!(
            "L'email {} est déjà associé à un compte non-clipper. Utilisez le formulaire de connexion classique.",
            user.email
        )
    } else {
        "Impossible de se connecter avec ce compte clipper, un autre compte clipper du même identifiant est déjà présent"
            .to_string()
    };
    CasResolution::Reject(reason)
}

/// Runs the resolution against the account store and applies it.
///
/// Returns the logged-in user, or `Err(reason)` when the login is refused.
pub async fn authenticate_cas(
    accounts: &dyn AccountRepo,
    identity: &CasIdentity,
    now: DateTime<Utc>,
) -> anyhow::Result<Result<User, String>> {
    let login = clean_cas_login(&identity.login);
    let unique_id = cas_unique_id(&login, &identity.home_directory);

    let existing = match accounts.find_user_by_email(&identity.email).await? {
        Some(user) => {
            let cas_account = accounts.find_cas_account(user.id).await?;
            Some((user, cas_account))
        }
        None => None,
    };

    let user = match resolve_cas_login(existing, &unique_id, now) {
        CasResolution::LogIn(user) => user,
        CasResolution::Create => accounts.create_cas_user(&identity.email, &login, &unique_id).await?,
        CasResolution::Replace(stale) => {
            tracing::info!(user_id = %stale.id, "replacing stale account with a CAS account");
            accounts
                .replace_with_cas_user(stale.id, &identity.email, &login, &unique_id)
                .await?
        }
        CasResolution::Reject(reason) => {
            tracing::warn!(login = %login, "CAS login refused");
            return Ok(Err(reason));
        }
    };
    accounts.touch_login(user.id, now).await?;
    Ok(Ok(User { last_login: Some(now), ..user }))
}
