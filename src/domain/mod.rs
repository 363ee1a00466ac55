pub mod delivery;
pub mod runfolder;
pub mod staging;
