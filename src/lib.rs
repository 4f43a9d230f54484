//! dualstore - One filter grammar and batch-write contract over two record stores:
//! a partitioned entity table and a SQL-queried document store

pub mod engine;
