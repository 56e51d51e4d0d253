mod command;
mod git_history;
mod reports;
mod sarif;
mod verification;

pub use command::CommandAdapter;
pub use git_history::GitHistoryAdapter;
pub use sarif::SarifAdapter;
pub use verification::VerificationReportAdapter;
