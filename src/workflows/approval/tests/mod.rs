mod common;
mod service;
mod state;
