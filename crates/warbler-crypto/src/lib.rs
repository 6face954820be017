/// Warbler credential handling.
///
/// Passwords are stored as Argon2id PHC strings. The salt and the cost
/// parameters travel inside the string, so verification never needs the
/// parameters the hash was created with.

pub mod password;

pub use password::Credentials;
