pub mod pack;
pub mod storage;
pub mod store;

#[cfg(test)]
mod testutil;
