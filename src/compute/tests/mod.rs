//! Unit tests for the Compute Engine client, resolvers and poll loops.

mod resolve;
