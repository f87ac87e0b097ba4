pub mod cashbackmodel;
pub mod pointsmodel;
pub mod referralmodel;
pub mod subscriptionmodels;
pub mod usermodel;
