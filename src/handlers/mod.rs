pub mod redirect;
pub mod setlink;
