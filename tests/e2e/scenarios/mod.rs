mod concurrency;
mod indexing;
mod resolution;
mod sessions;
