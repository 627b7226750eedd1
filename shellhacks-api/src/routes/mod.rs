/// API route handlers
///
/// - `health`: Health check endpoint
/// - `applicants`: Registration, login, password reset and the application form
/// - `admin`: Organizer dashboard (listing, acceptance, attendance, reminders)

pub mod admin;
pub mod applicants;
pub mod health;
