/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and registration password rules
/// - [`tokens`]: opaque bearer tokens with refresh, rotation and revocation
/// - [`authorization`]: identity resolution and board-ownership checks
///
/// # Example
///
/// ```
/// use kanban_shared::auth::password::{hash_password, verify_password};
/// use kanban_shared::auth::tokens::extract_bearer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("hunter22")?;
/// assert!(verify_password("hunter22", &hash)?);
///
/// assert_eq!(extract_bearer("Bearer kat_abc"), Some("kat_abc"));
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod password;
pub mod tokens;
