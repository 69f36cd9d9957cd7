use std::fmt;

use course_core::access::{Access, LEARNER_ROLES, can_access};
use course_core::credentials::{Credentials, NewPassword, RegistrationProfile};
use course_core::model::{CourseId, IdentityState, LectureId};
use course_core::progress::{CourseProgress, next_unwatched};
use services::{
    AppServices, CatalogError, EnrollOutcome, MarkOutcome, ProgressError, SessionError,
};

use crate::ArgsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WhoAmI,
    Login { email: String, password: String },
    Logout,
    SendCode { email: String },
    Register { name: String, email: String, password: String, code: String },
    ForgotPassword { email: String },
    ResetPassword { token: String, password: String, confirmation: String },
    Courses,
    Course { course_id: CourseId },
    MyCourses,
    Enroll { course_id: CourseId },
    Progress { course_id: CourseId },
    Watch { course_id: CourseId, lecture_id: LectureId },
}

fn take(
    args: &mut impl Iterator<Item = String>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ArgsError> {
    args.next()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ArgsError::MissingArgument { command, name })
}

fn finish(args: &mut impl Iterator<Item = String>, command: &'static str) -> Result<(), ArgsError> {
    match args.next() {
        Some(raw) => Err(ArgsError::UnexpectedArgument { command, raw }),
        None => Ok(()),
    }
}

impl Command {
    pub fn parse(name: &str, mut args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let args = &mut args;
        let command = match name {
            "whoami" => Self::WhoAmI,
            "login" => Self::Login {
                email: take(args, "login", "email")?,
                password: take(args, "login", "password")?,
            },
            "logout" => Self::Logout,
            "send-code" => Self::SendCode {
                email: take(args, "send-code", "email")?,
            },
            "register" => Self::Register {
                name: take(args, "register", "name")?,
                email: take(args, "register", "email")?,
                password: take(args, "register", "password")?,
                code: take(args, "register", "code")?,
            },
            "forgot-password" => Self::ForgotPassword {
                email: take(args, "forgot-password", "email")?,
            },
            "reset-password" => Self::ResetPassword {
                token: take(args, "reset-password", "reset-token")?,
                password: take(args, "reset-password", "password")?,
                confirmation: take(args, "reset-password", "confirmation")?,
            },
            "courses" => Self::Courses,
            "course" => Self::Course {
                course_id: CourseId::new(take(args, "course", "course-id")?),
            },
            "my-courses" => Self::MyCourses,
            "enroll" => Self::Enroll {
                course_id: CourseId::new(take(args, "enroll", "course-id")?),
            },
            "progress" => Self::Progress {
                course_id: CourseId::new(take(args, "progress", "course-id")?),
            },
            "watch" => Self::Watch {
                course_id: CourseId::new(take(args, "watch", "course-id")?),
                lecture_id: LectureId::new(take(args, "watch", "lecture-id")?),
            },
            other => return Err(ArgsError::UnknownCommand(other.to_string())),
        };
        finish(args, command.name())?;
        Ok(command)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::WhoAmI => "whoami",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::SendCode { .. } => "send-code",
            Self::Register { .. } => "register",
            Self::ForgotPassword { .. } => "forgot-password",
            Self::ResetPassword { .. } => "reset-password",
            Self::Courses => "courses",
            Self::Course { .. } => "course",
            Self::MyCourses => "my-courses",
            Self::Enroll { .. } => "enroll",
            Self::Progress { .. } => "progress",
            Self::Watch { .. } => "watch",
        }
    }
}

/// A failure worth showing to the person at the terminal.
#[derive(Debug)]
pub enum CommandError {
    Session(SessionError),
    Progress(ProgressError),
    Catalog(CatalogError),
    Access(Access),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Session(err) => f.write_str(&err.user_message()),
            CommandError::Progress(err) => f.write_str(&err.user_message()),
            CommandError::Catalog(err) => f.write_str(&err.user_message()),
            CommandError::Access(Access::Denied) => {
                f.write_str("You do not have permission to view this page.")
            }
            CommandError::Access(_) => f.write_str("Authentication required! Please log in."),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        tracing::debug!(error = ?err, "session command failed");
        CommandError::Session(err)
    }
}

impl From<ProgressError> for CommandError {
    fn from(err: ProgressError) -> Self {
        tracing::debug!(error = ?err, "progress command failed");
        CommandError::Progress(err)
    }
}

impl From<CatalogError> for CommandError {
    fn from(err: CatalogError) -> Self {
        tracing::debug!(error = ?err, "catalog command failed");
        CommandError::Catalog(err)
    }
}

impl From<course_core::ValidationError> for CommandError {
    fn from(err: course_core::ValidationError) -> Self {
        CommandError::Session(SessionError::Validation(err))
    }
}

/// Settle the stored session, tolerating an unreachable backend.
async fn restore(services: &AppServices) -> IdentityState {
    if let Err(err) = services.session().bootstrap().await {
        tracing::warn!(error = %err, "could not restore session");
    }
    services.session().identity_state()
}

/// Settle the stored session and require a learner identity.
async fn require_learner(services: &AppServices) -> Result<(), CommandError> {
    services.session().bootstrap().await?;
    match can_access(&services.session().identity_state(), LEARNER_ROLES) {
        Access::Allow => Ok(()),
        other => {
            if let Some(route) = other.redirect() {
                tracing::debug!(route = route.path(), "redirecting");
            }
            Err(CommandError::Access(other))
        }
    }
}

fn print_progress(progress: &CourseProgress) {
    println!("Progress: {:.0}%", progress.percent);
    for module in &progress.modules {
        let mark = if module.is_empty() {
            "-"
        } else if module.is_complete {
            "x"
        } else {
            " "
        };
        println!(
            "  [{mark}] {} ({}/{})",
            module.title, module.watched, module.total
        );
    }
}

pub async fn execute(
    services: &AppServices,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::WhoAmI => match restore(services).await {
            IdentityState::Present(identity) => {
                println!("{} <{}> ({})", identity.name(), identity.email(), identity.role());
                println!(
                    "Enrolled in {} course(s).",
                    identity.enrolled_course_ids().len()
                );
            }
            _ => println!("Not signed in."),
        },
        Command::Login { email, password } => {
            let credentials = Credentials::new(email, password).map_err(CommandError::from)?;
            let identity = services
                .session()
                .login(&credentials)
                .await
                .map_err(CommandError::from)?;
            println!("Welcome back, {}!", identity.name());
            println!("Continue at {}", identity.home_route().path());
        }
        Command::Logout => {
            restore(services).await;
            let route = services.session().logout().await.map_err(CommandError::from)?;
            println!("Signed out. Continue at {}", route.path());
        }
        Command::SendCode { email } => {
            services
                .session()
                .send_verification_code(&email)
                .await
                .map_err(CommandError::from)?;
            println!("Verification code sent to {}.", email.trim());
        }
        Command::Register {
            name,
            email,
            password,
            code,
        } => {
            let profile =
                RegistrationProfile::new(name, email, password).map_err(CommandError::from)?;
            let session = services.session();
            session
                .verify_code(profile.email(), &code)
                .await
                .map_err(CommandError::from)?;
            let identity = session.register(&profile).await.map_err(CommandError::from)?;
            println!("Account created. Welcome, {}!", identity.name());
        }
        Command::ForgotPassword { email } => {
            let message = services
                .session()
                .forgot_password(&email)
                .await
                .map_err(CommandError::from)?;
            println!("{message}");
        }
        Command::ResetPassword {
            token,
            password,
            confirmation,
        } => {
            let password = NewPassword::new(password, &confirmation).map_err(CommandError::from)?;
            let message = services
                .session()
                .reset_password(&token, &password)
                .await
                .map_err(CommandError::from)?;
            println!("{message}");
        }
        Command::Courses => {
            let courses = services
                .catalog()
                .list_courses()
                .await
                .map_err(CommandError::from)?;
            if courses.is_empty() {
                println!("No courses published yet.");
            }
            for course in courses {
                println!("{}  {}  ${:.2}", course.id, course.title, course.price);
            }
        }
        Command::Course { course_id } => {
            let catalog = services.catalog();
            let course = catalog
                .get_course(&course_id)
                .await
                .map_err(CommandError::from)?;
            let outline = catalog
                .outline(&course_id)
                .await
                .map_err(CommandError::from)?;
            println!("{}  ${:.2}", course.title, course.price);
            if !course.description.is_empty() {
                println!("{}", course.description);
            }
            for module in outline.modules() {
                println!("Module {}: {}", module.number, module.title);
                for lecture in &module.lectures {
                    println!("  {}. {} [{}]", lecture.number, lecture.title, lecture.id);
                }
            }
        }
        Command::MyCourses => {
            require_learner(services).await?;
            let progress = services.progress();
            progress
                .fetch_enrolled_courses()
                .await
                .map_err(CommandError::from)?;
            let courses = progress.enrolled_courses();
            if courses.is_empty() {
                println!("You are not enrolled in any course.");
            }
            for course in courses {
                println!("{}  {}", course.id, course.title);
            }
        }
        Command::Enroll { course_id } => {
            require_learner(services).await?;
            let outcome = services
                .progress()
                .enroll(&course_id)
                .await
                .map_err(CommandError::from)?;
            match outcome {
                EnrollOutcome::Enrolled => println!("Enrolled in {course_id}."),
                EnrollOutcome::AlreadyEnrolled => println!("Already enrolled in {course_id}."),
            }
        }
        Command::Progress { course_id } => {
            require_learner(services).await?;
            let tracker = services.progress();
            let progress = tracker
                .open_course(&course_id)
                .await
                .map_err(CommandError::from)?;
            print_progress(&progress);
            if let Some(outline) = tracker.active_course() {
                match next_unwatched(&outline, &tracker.watched()) {
                    Some(lecture) => println!("Next up: {} [{}]", lecture.title, lecture.id),
                    None => println!("Course complete."),
                }
            }
        }
        Command::Watch {
            course_id,
            lecture_id,
        } => {
            require_learner(services).await?;
            let tracker = services.progress();
            tracker
                .open_course(&course_id)
                .await
                .map_err(CommandError::from)?;
            let outcome = tracker
                .mark_watched(&lecture_id)
                .await
                .map_err(CommandError::from)?;
            match outcome {
                MarkOutcome::Marked => println!("Marked {lecture_id} as watched."),
                MarkOutcome::AlreadyWatched => println!("{lecture_id} was already watched."),
                MarkOutcome::InFlight => println!("{lecture_id} is already being saved."),
            }
            if let Some(progress) = tracker.progress() {
                print_progress(&progress);
            }
        }
    }
    Ok(())
}
