pub mod category;
pub mod classification;
pub mod journal;
pub mod placement;
