/// Navigation targets the session layer can ask the shell to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Login,
    AdminDashboard,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Login => "/auth/login",
            Route::AdminDashboard => "/dashboard/admin",
        }
    }
}
