/// Data models
///
/// - `applicant`: The applicant record, its free-form profile and the
///   application status state machine
pub mod applicant;
