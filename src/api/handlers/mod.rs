pub mod disputes;
pub mod events;
pub mod ingress;
pub mod listings;
pub mod orders;
pub mod users;
