/// Router Module Index
///
/// Routes are split by access level; the guard is applied per module in
/// `create_router`, never inside handlers.

/// Routes open to every visitor: the gallery, sign-in/out and read-only API.
pub mod public;

/// Routes behind the session: the management screen and the API writes.
pub mod authenticated;
