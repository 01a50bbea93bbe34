mod common;
mod exchange;
mod ledger;
