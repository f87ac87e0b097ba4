pub mod referrals;
pub mod stripe_webhook;
