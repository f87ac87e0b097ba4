pub mod cashbackdb;
pub mod db;
pub mod ledger_tx;
pub mod pointsdb;
pub mod referraldb;
pub mod subscriptiondb;
pub mod userdb;
pub mod webhookdb;

#[cfg(test)]
pub mod mock_db;
