pub mod dates;
pub mod db_utils;
pub mod identity_cache;
