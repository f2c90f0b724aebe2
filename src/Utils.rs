/// logger setup for the demos and for applications embedding the cache
pub mod logger;
