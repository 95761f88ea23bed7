pub mod chats;
pub mod doctor;
pub mod onboard;
pub mod serve;
pub mod users;
