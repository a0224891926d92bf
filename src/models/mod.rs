pub mod category;
pub mod media;
pub mod option;
pub mod post;
pub mod tag;
pub mod user;
