mod config;
mod normalize;
mod utils;
