pub mod local;
pub mod qvl;
pub mod remote;
pub mod token;

pub use local::{LibraryVerdict, QuoteVerifierLocal, QvStatus, VerificationLibrary};
pub use qvl::QvlLibrary;
pub use remote::RemoteAttestationClient;
pub use token::{JwksVerifier, Token, TokenVerifier};
