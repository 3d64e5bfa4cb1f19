mod client;
mod compose;
