use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Create,
    Change,
    Workspace,
    Dash,
    Profile,
}

impl Route {
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim().trim_end_matches('/');
        let path = path.strip_prefix('/').unwrap_or(path);
        Some(match path {
            "login" | "" => Route::Login,
            "Create" => Route::Create,
            "Change" => Route::Change,
            "workspace" => Route::Workspace,
            "dash" | "dashboard" => Route::Dash,
            "profile" => Route::Profile,
            _ => return None,
        })
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Create => "/Create",
            Route::Change => "/Change",
            Route::Workspace => "/workspace",
            Route::Dash => "/dash",
            Route::Profile => "/profile",
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, Route::Workspace | Route::Dash | Route::Profile)
    }

    /// Where a request for `self` actually lands. Gated screens fall back to
    /// login without a session; auth screens skip ahead with one.
    pub fn resolve(self, authenticated: bool) -> Route {
        match (self.requires_auth(), authenticated) {
            (true, false) => Route::Login,
            (false, true) => Route::Dash,
            _ => self,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
