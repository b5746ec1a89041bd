pub mod bar;
pub mod tick;
