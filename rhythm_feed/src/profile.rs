use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;

use rhythm_core::social::{Profile, SessionUser};
use rhythm_core::{Error, ProfileSource, Result};

pub const BASE_USERNAME_MAX: usize = 20;
pub const USERNAME_MAX: usize = 24;
pub const PROVISION_ATTEMPTS: usize = 6;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[a-zA-Z0-9_]{3,24}$").unwrap();
}

/// Fields a user can edit on the profile page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub display_name: String,
    pub username: String,
    pub bio: String,
    pub website: String,
}

pub fn is_valid_username(name: &str) -> bool {
    USERNAME.is_match(name)
}

/// `Jane.Doe+poems@example.com` becomes `janedoepoems`.
pub fn base_username(email: Option<&str>) -> String {
    let local = email.unwrap_or_default().split('@').next().unwrap_or_default();
    let cleaned = local
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .take(BASE_USERNAME_MAX)
        .collect::<String>();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

/// The base name first, then the base with random 4 digit suffixes.
pub fn username_candidates<R: Rng>(base: &str, rng: &mut R) -> Vec<String> {
    let mut candidates = vec![base.to_string()];
    for _ in 1..PROVISION_ATTEMPTS {
        let mut candidate = format!("{}{}", base, rng.gen_range(1000..10000));
        candidate.truncate(USERNAME_MAX);
        candidates.push(candidate);
    }
    candidates
}

/// Return the user's profile, creating it with a free username on first sign in.
pub async fn ensure_profile<S>(source: &S, user: &SessionUser) -> Result<Profile>
where
    S: ProfileSource + ?Sized,
{
    if let Some(profile) = source.profile(&user.id).await? {
        return Ok(profile);
    }

    let base = base_username(user.email.as_deref());
    let candidates = username_candidates(&base, &mut rand::thread_rng());
    for candidate in candidates {
        let profile = Profile {
            id: user.id.clone(),
            username: candidate,
            ..Default::default()
        };
        match source.insert_profile(&profile).await {
            Ok(profile) => {
                tracing::info!("Created profile {} for user {}", profile.username, user.id);
                return Ok(profile);
            }
            Err(Error::ObjectAlreadyExists(_)) => {
                // Either the name is taken or another request created this user's row.
                if let Some(profile) = source.profile(&user.id).await? {
                    return Ok(profile);
                }
                tracing::debug!("Username {} taken", profile.username);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::ObjectAlreadyExists(format!("every username derived from {}", base)))
}

pub async fn update_profile<S>(source: &S, user: &SessionUser, update: &ProfileUpdate) -> Result<Profile>
where
    S: ProfileSource + ?Sized,
{
    let username = update.username.trim();
    if !username.is_empty() && !is_valid_username(username) {
        return Err(Error::InvalidField(
            "username must be 3 to 24 characters (letters, numbers, underscore)".to_string(),
        ));
    }
    let profile = Profile {
        id: user.id.clone(),
        username: username.to_string(),
        display_name: update.display_name.trim().to_string(),
        bio: update.bio.trim().to_string(),
        website: update.website.trim().to_string(),
        avatar_url: String::new(),
    };
    let profile = source.upsert_profile(&profile).await?;
    tracing::info!("Updated profile of user {}", user.id);
    Ok(profile)
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::fake::FakeSource;

    fn user(id: &str, email: &str) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            email: Some(email.to_string()),
        }
    }

    #[test]
    fn test_base_username() {
        assert_eq!(base_username(Some("Jane.Doe+poems@example.com")), "janedoepoems");
        assert_eq!(base_username(Some("a_b_c@x.io")), "a_b_c");
        assert_eq!(base_username(Some("...@x.io")), "user");
        assert_eq!(base_username(None), "user");
        assert_eq!(
            base_username(Some("averyveryverylongnameindeed@x.io")),
            "averyveryverylongnam"
        );
    }

    #[test]
    fn test_username_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = username_candidates("averyveryverylongnam", &mut rng);
        assert_eq!(candidates.len(), PROVISION_ATTEMPTS);
        assert_eq!(candidates[0], "averyveryverylongnam");
        for candidate in &candidates[1..] {
            assert_eq!(candidate.len(), USERNAME_MAX);
            assert!(is_valid_username(candidate));
            let suffix = &candidate[BASE_USERNAME_MAX..];
            assert!(suffix.parse::<u32>().is_ok_and(|n| (1000..10000).contains(&n)));
        }
    }

    #[test]
    fn test_username_validation() {
        assert!(is_valid_username("bob_42"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(25)));
    }

    #[tokio::test]
    async fn test_existing_profile_is_returned() {
        let source = FakeSource::default();
        source.add_profile(Profile {
            id: "u1".to_string(),
            username: "poet".to_string(),
            ..Default::default()
        });
        let profile = ensure_profile(&source, &user("u1", "someone@x.io")).await.unwrap();
        assert_eq!(profile.username, "poet");
        assert_eq!(source.profile_inserts(), 0);
    }

    #[tokio::test]
    async fn test_taken_base_gets_suffix() {
        let source = FakeSource::default();
        source.add_profile(Profile {
            id: "other".to_string(),
            username: "jane".to_string(),
            ..Default::default()
        });

        let profile = ensure_profile(&source, &user("u1", "Jane@x.io")).await.unwrap();
        assert!(profile.username.starts_with("jane"));
        assert_eq!(profile.username.len(), 8);
        assert_eq!(source.profile_inserts(), 2);
        assert_eq!(source.stored_profile("u1").unwrap().username, profile.username);

        // Provisioning twice doesn't create another row
        let again = ensure_profile(&source, &user("u1", "Jane@x.io")).await.unwrap();
        assert_eq!(again, profile);
        assert_eq!(source.profile_inserts(), 2);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let source = FakeSource::default();
        let jane = user("u1", "jane@x.io");

        let update = ProfileUpdate {
            display_name: "  Jane  ".to_string(),
            username: "jane doe".to_string(),
            ..Default::default()
        };
        let err = update_profile(&source, &jane, &update).await.unwrap_err();
        assert!(matches!(err, Error::InvalidField(_)));
        assert!(source.stored_profile("u1").is_none());

        let update = ProfileUpdate {
            username: " jane_doe ".to_string(),
            ..update
        };
        let profile = update_profile(&source, &jane, &update).await.unwrap();
        assert_eq!(profile.username, "jane_doe");
        assert_eq!(profile.display_name, "Jane");

        // Clearing the username is allowed
        let update = ProfileUpdate::default();
        let profile = update_profile(&source, &jane, &update).await.unwrap();
        assert_eq!(profile.username, "");
    }
}
