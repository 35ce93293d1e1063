pub mod google;
pub mod hubspot;
pub mod salesforce;

pub use google::{BookMeetingTool, GoogleCalendarClient};
pub use hubspot::{HubSpotClient, HubSpotCreateContactTool, HubSpotSearchTool, HubSpotUpdateContactTool};
pub use salesforce::{CreateRecordTool, GetDataTool, SalesforceClient, UpdateRecordsTool};
