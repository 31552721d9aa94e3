/// Header carrying an API key for non-browser clients.
pub const API_KEY_HEADER: &str = "X-API-KEY";

pub mod permissions {

    /// Super-grant: satisfies any required permission set.
    pub const ADMIN: &str = "admin";

    pub const VIEW_USERS: &str = "view-users";

    pub const MODIFY_USERS: &str = "modify-users";

    pub const MANAGE_USERS: &str = "manage-users";

    pub const VIEW_LOGS: &str = "view-logs";

    /// Seeded by the initial schema revision.
    pub const DEFAULTS: &[(&str, &str)] = &[
        (ADMIN, "Permission for all functionality, including plugins"),
        (VIEW_USERS, "Access the users panel and view all users"),
        (MODIFY_USERS, "Modify permissions for existing users"),
        (MANAGE_USERS, "Create/delete users"),
        (VIEW_LOGS, "Access the logs panel and view all logs"),
        ("manage-accounts", "Create/delete remote accounts"),
        ("view-plugins", "Access the plugins panel and view settings"),
        ("manage-plugins", "Add/remove plugins"),
        ("modify-plugins", "Modify settings for plugins"),
    ];
}

pub mod session {

    /// Payload key holding the bound user id.
    pub const USER_ID_KEY: &str = "user_id";

    pub const USERNAME_KEY: &str = "username";
}

pub mod limits {

    pub const MAX_USERNAME_LENGTH: usize = 26;

    pub const MIN_HASH_OUTPUT_BYTES: u32 = 64;

    pub const MIN_SALT_BYTES: u32 = 32;
}
