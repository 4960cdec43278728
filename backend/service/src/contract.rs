//! `sol!` bindings for the deployed Green Token contract.
//!
//! The contract is an external collaborator; every field it returns is
//! treated as untrusted input and normalised at the decoding boundary
//! (see `events.rs`).

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract GreenToken {
        function owner() external view returns (address);
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function getRegisteredUser(address wallet) external view returns (
            string name,
            string companyType,
            string registrationNumber,
            string country,
            string city,
            string physicalAddress,
            string email,
            string phone,
            bool verified
        );

        function registerUser(
            string name,
            string companyType,
            string registrationNumber,
            string country,
            string city,
            string physicalAddress,
            string email,
            string phone
        ) external;
        function verifyCompany(address wallet) external;
        function transfer(address to, uint256 amount) external returns (bool);
        function mint(address to, uint256 amount, string name) external;
        function submitReport(string description, string location, string evidenceUri) external;
        function verifyReport(uint256 id, uint256 reward) external payable;

        function getVisibleReports() external view returns (uint256[] ids);
        function reports(uint256 id) external view returns (
            string description,
            string location,
            address reporter,
            uint256 timestamp,
            string evidenceUri,
            bool verified,
            uint256 reward
        );

        event UserRegistered(
            address indexed wallet,
            string name,
            string companyType,
            string registrationNumber,
            string country,
            string city,
            string physicalAddress,
            string email,
            string phone,
            bool verified
        );
        event CompanyVerified(address indexed wallet);
        event Transfer(address indexed from, address indexed to, uint256 value);
        event ReportVerified(uint256 indexed id, address indexed reporter, uint256 reward);
    }
}
