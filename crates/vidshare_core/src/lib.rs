pub mod domain;
pub mod ports;
pub mod session;

pub use domain::{
    ApplicationUser, AuthState, Profile, RemoteUserIdentity, Role, Session, SessionChange,
    SessionEvent, SignupData, SignupOutcome, UserMetadata,
};
pub use ports::{AuthService, PortError, PortResult, ProfileStore};
pub use session::{RemoteService, SessionError, SessionManager};
