//! Closed set of response tags and their human-readable messages.
//!
//! The wire carries tags as strings. Inside the code they are a closed enum so
//! that every failure reason has exactly one tag and one message, checked by
//! match exhaustiveness instead of a runtime lookup table.

use std::fmt;

/// Every payload-less response the servers can send, plus the success tags
/// whose messages carry a payload (see [`ResponseTag::carries_payload`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseTag {
    // Authorization failures shared by many operations
    /// Caller is not a member of ADMIN
    FailNoAdmin,
    /// Caller token missing, malformed or not signed by this server
    FailBadToken,
    /// Caller does not own the group
    FailNoOwner,
    /// Target user already exists
    FailUserExist,
    /// Target group already exists
    FailGroupExist,
    /// Target user does not exist
    FailUserNoExist,
    /// Target group does not exist
    FailGroupNoExist,
    /// Target user is already a member
    FailMember,
    /// Target user is not a member
    FailNoMember,
    /// Target user already owns the group
    FailOwner,
    /// Target user does not own the group
    FailUserNoOwner,
    /// Removing this owner would leave the group without one
    FailLastOwner,
    /// User or group name is empty or contains the reserved token character
    FailBadName,

    // Per-operation outcomes
    /// Token issuance failed
    FailGet,
    /// Token issued (payload: token)
    SuccessGet,
    /// User creation failed
    FailCuser,
    /// User created
    SuccessCuser,
    /// User deletion failed
    FailDuser,
    /// User deleted
    SuccessDuser,
    /// Group creation failed
    FailCgroup,
    /// Group created
    SuccessCgroup,
    /// Group deletion failed
    FailDgroup,
    /// Group deleted
    SuccessDgroup,
    /// Adding a member failed
    FailAddUserToGroup,
    /// Member added
    SuccessAddUserToGroup,
    /// Removing a member failed
    FailDeleteUserFromGroup,
    /// Member removed
    SuccessDeleteUserFromGroup,
    /// Adding an owner failed
    FailAddOwnerToGroup,
    /// Owner added
    SuccessAddOwnerToGroup,
    /// Removing an owner failed
    FailDeleteOwnerFromGroup,
    /// Owner removed
    SuccessDeleteOwnerFromGroup,
    /// Listing members failed
    FailListMembers,
    /// Members listed (payload: member names)
    SuccessListMembers,
    /// Handshake failed
    FailConnect,
    /// Handshake succeeded (payload: challenge + 1)
    SuccessConnect,
    /// Public key rejected by the client
    FailKey,
    /// Public key accepted by the client
    SuccessKey,
    /// Group key unavailable to the caller
    FailGetKey,
    /// Group key returned (payload: key, version)
    SuccessGetKey,

    // File server outcomes
    /// File request carried an invalid token
    FailFileBadToken,
    /// Remote path is empty, too long, or has a `.` or `..` component
    FailBadPath,
    /// Upload target already exists
    FailFileExists,
    /// Upload group not present in the token
    FailUnauthorized,
    /// Upload stream ended without EOF
    ErrorTransfer,
    /// Download target is not in the index, or a delete target is indexed
    /// but missing from disk
    ErrorFileMissing,
    /// Delete target is not in the index
    ErrorDoesntExist,
    /// Token does not grant the file's group
    ErrorPermission,
    /// Indexed file is missing from disk
    ErrorNotOnDisk,
    /// Disk deletion failed
    ErrorDelete,

    /// Request not understood
    Fail,
}

impl ResponseTag {
    /// Every tag, in declaration order.
    pub const ALL: [Self; 50] = [
        Self::FailNoAdmin,
        Self::FailBadToken,
        Self::FailNoOwner,
        Self::FailUserExist,
        Self::FailGroupExist,
        Self::FailUserNoExist,
        Self::FailGroupNoExist,
        Self::FailMember,
        Self::FailNoMember,
        Self::FailOwner,
        Self::FailUserNoOwner,
        Self::FailLastOwner,
        Self::FailBadName,
        Self::FailGet,
        Self::SuccessGet,
        Self::FailCuser,
        Self::SuccessCuser,
        Self::FailDuser,
        Self::SuccessDuser,
        Self::FailCgroup,
        Self::SuccessCgroup,
        Self::FailDgroup,
        Self::SuccessDgroup,
        Self::FailAddUserToGroup,
        Self::SuccessAddUserToGroup,
        Self::FailDeleteUserFromGroup,
        Self::SuccessDeleteUserFromGroup,
        Self::FailAddOwnerToGroup,
        Self::SuccessAddOwnerToGroup,
        Self::FailDeleteOwnerFromGroup,
        Self::SuccessDeleteOwnerFromGroup,
        Self::FailListMembers,
        Self::SuccessListMembers,
        Self::FailConnect,
        Self::SuccessConnect,
        Self::FailKey,
        Self::SuccessKey,
        Self::FailGetKey,
        Self::SuccessGetKey,
        Self::FailFileBadToken,
        Self::FailBadPath,
        Self::FailFileExists,
        Self::FailUnauthorized,
        Self::ErrorTransfer,
        Self::ErrorFileMissing,
        Self::ErrorDoesntExist,
        Self::ErrorPermission,
        Self::ErrorNotOnDisk,
        Self::ErrorDelete,
        Self::Fail,
    ];

    /// Wire string for this tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailNoAdmin => "FAIL_NO_ADMIN",
            Self::FailBadToken => "FAIL_BAD_TOKEN",
            Self::FailNoOwner => "FAIL_NO_OWNER",
            Self::FailUserExist => "FAIL_USER_EXIST",
            Self::FailGroupExist => "FAIL_GROUP_EXIST",
            Self::FailUserNoExist => "FAIL_USER_NO_EXIST",
            Self::FailGroupNoExist => "FAIL_GROUP_NO_EXIST",
            Self::FailMember => "FAIL_MEMBER",
            Self::FailNoMember => "FAIL_NO_MEMBER",
            Self::FailOwner => "FAIL_OWNER",
            Self::FailUserNoOwner => "FAIL_USER_NO_OWNER",
            Self::FailLastOwner => "FAIL_LAST_OWNER",
            Self::FailBadName => "FAIL_BAD_NAME",
            Self::FailGet => "FAIL_GET",
            Self::SuccessGet => "SUCCESS_GET",
            Self::FailCuser => "FAIL_CUSER",
            Self::SuccessCuser => "SUCCESS_CUSER",
            Self::FailDuser => "FAIL_DUSER",
            Self::SuccessDuser => "SUCCESS_DUSER",
            Self::FailCgroup => "FAIL_CGROUP",
            Self::SuccessCgroup => "SUCCESS_CGROUP",
            Self::FailDgroup => "FAIL_DGROUP",
            Self::SuccessDgroup => "SUCCESS_DGROUP",
            Self::FailAddUserToGroup => "FAIL_ADD_USER_TO_GROUP",
            Self::SuccessAddUserToGroup => "SUCCESS_ADD_USER_TO_GROUP",
            Self::FailDeleteUserFromGroup => "FAIL_DELETE_USER_FROM_GROUP",
            Self::SuccessDeleteUserFromGroup => "SUCCESS_DELETE_USER_FROM_GROUP",
            Self::FailAddOwnerToGroup => "FAIL_ADD_OWNER_TO_GROUP",
            Self::SuccessAddOwnerToGroup => "SUCCESS_ADD_OWNER_TO_GROUP",
            Self::FailDeleteOwnerFromGroup => "FAIL_DELETE_OWNER_FROM_GROUP",
            Self::SuccessDeleteOwnerFromGroup => "SUCCESS_DELETE_OWNER_FROM_GROUP",
            Self::FailListMembers => "FAIL_LIST_MEMBERS",
            Self::SuccessListMembers => "SUCCESS_LIST_MEMBERS",
            Self::FailConnect => "FAIL_CONNECT",
            Self::SuccessConnect => "SUCCESS_CONNECT",
            Self::FailKey => "FAIL_KEY",
            Self::SuccessKey => "SUCCESS_KEY",
            Self::FailGetKey => "FAIL_GET_KEY",
            Self::SuccessGetKey => "SUCCESS_GET_KEY",
            Self::FailFileBadToken => "FAIL-BADTOKEN",
            Self::FailBadPath => "FAIL-BADPATH",
            Self::FailFileExists => "FAIL-FILEEXISTS",
            Self::FailUnauthorized => "FAIL-UNAUTHORIZED",
            Self::ErrorTransfer => "ERROR-TRANSFER",
            Self::ErrorFileMissing => "ERROR_FILEMISSING",
            Self::ErrorDoesntExist => "ERROR_DOESNTEXIST",
            Self::ErrorPermission => "ERROR_PERMISSION",
            Self::ErrorNotOnDisk => "ERROR_NOTONDISK",
            Self::ErrorDelete => "ERROR_DELETE",
            Self::Fail => "FAIL",
        }
    }

    /// Parse a wire string. `None` if it is not a response tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Human-readable text shown to the end user.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::FailNoAdmin => {
                "You must be an admin to perform that action.\nPlease obtain an admin token and try again."
            },
            Self::FailBadToken | Self::FailFileBadToken => {
                "You must obtain a valid token to perform this action."
            },
            Self::FailNoOwner => "You must be the owner of the group to perform this action.",
            Self::FailUserExist => "That user already exists.",
            Self::FailGroupExist => "That group already exists.",
            Self::FailUserNoExist => "That user does not exist.",
            Self::FailGroupNoExist => "That group does not exist.",
            Self::FailMember => "That user is already a member of that group.",
            Self::FailNoMember => "That user is not a member of that group.",
            Self::FailOwner => "That user is already an owner of that group.",
            Self::FailUserNoOwner => "That user is not an owner of that group.",
            Self::FailLastOwner => "A group must keep at least one owner.",
            Self::FailBadName => "Names must be non-empty and must not contain \"|\".",
            Self::FailGet => "An error occurred while obtaining a token.",
            Self::SuccessGet => "Token obtained successfully.",
            Self::FailCuser => "An error occurred while creating this user.",
            Self::SuccessCuser => "User created successfully.",
            Self::FailDuser => "An error occurred while deleting this user.",
            Self::SuccessDuser => "User deleted successfully.",
            Self::FailCgroup => "An error occurred while creating this group.",
            Self::SuccessCgroup => "Group successfully created.",
            Self::FailDgroup => "An error occurred while deleting this group.",
            Self::SuccessDgroup => "Group successfully deleted.",
            Self::FailAddUserToGroup => "An error occurred while adding this user to the group.",
            Self::SuccessAddUserToGroup => "User successfully added to group.",
            Self::FailDeleteUserFromGroup => {
                "An error occurred while deleting this user from the group."
            },
            Self::SuccessDeleteUserFromGroup => "User successfully deleted from group.",
            Self::FailAddOwnerToGroup => "An error occurred while adding this owner to the group.",
            Self::SuccessAddOwnerToGroup => "Owner successfully added to group.",
            Self::FailDeleteOwnerFromGroup => {
                "An error occurred while removing this owner from the group."
            },
            Self::SuccessDeleteOwnerFromGroup => "Owner successfully removed from group.",
            Self::FailListMembers => "An error occurred while fetching the members of this group.",
            Self::SuccessListMembers => "Successfully fetched members of this group.",
            Self::FailConnect => "An error occurred while connecting to the server.",
            Self::SuccessConnect => "Secure connection to the server established.",
            Self::FailKey => "Host key verification failed.",
            Self::SuccessKey => "Host key accepted.",
            Self::FailGetKey => "An error occurred when trying to grab the key.",
            Self::SuccessGetKey => "Success retrieving key.",
            Self::FailBadPath => "That path is empty, too long, or uses \".\" or \"..\".",
            Self::FailFileExists => "A file already exists at that path.",
            Self::FailUnauthorized => "Your token does not grant access to that group.",
            Self::ErrorTransfer => "The file transfer was interrupted.",
            Self::ErrorFileMissing => "That file is missing.",
            Self::ErrorDoesntExist => "That file does not exist.",
            Self::ErrorPermission => "You do not have permission to access that file.",
            Self::ErrorNotOnDisk => "That file is missing from the server's disk.",
            Self::ErrorDelete => "The server could not delete that file.",
            Self::Fail => "The server did not understand that request.",
        }
    }

    /// True for tags whose message carries a payload and therefore decodes
    /// into a dedicated [`crate::Message`] variant rather than a status.
    #[must_use]
    pub fn carries_payload(self) -> bool {
        matches!(
            self,
            Self::SuccessGet | Self::SuccessListMembers | Self::SuccessConnect | Self::SuccessGetKey
        )
    }

    /// True for success outcomes.
    #[must_use]
    pub fn is_success(self) -> bool {
        self.as_str().starts_with("SUCCESS")
    }
}

impl fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn wire_strings_are_unique() {
        let mut seen = HashSet::new();
        for tag in ResponseTag::ALL {
            seen.insert(tag.as_str());
        }
        assert_eq!(seen.len(), ResponseTag::ALL.len());
    }

    #[test]
    fn every_tag_parses_back() {
        for tag in ResponseTag::ALL {
            assert_eq!(ResponseTag::from_tag(tag.as_str()), Some(tag));
        }
    }

    #[test]
    fn every_tag_has_a_message() {
        for tag in ResponseTag::ALL {
            assert!(!tag.message().is_empty(), "{tag} has no message");
        }
    }

    #[test]
    fn missing_and_unindexed_files_are_told_apart() {
        assert_ne!(ResponseTag::ErrorDoesntExist.as_str(), ResponseTag::ErrorFileMissing.as_str());
        assert_ne!(
            ResponseTag::ErrorDoesntExist.message(),
            ResponseTag::ErrorFileMissing.message()
        );
        assert_eq!(ResponseTag::from_tag("ERROR_DOESNTEXIST"), Some(ResponseTag::ErrorDoesntExist));
        assert_eq!(ResponseTag::from_tag("FAIL-BADPATH"), Some(ResponseTag::FailBadPath));
    }

    #[test]
    fn unknown_strings_are_not_tags() {
        assert_eq!(ResponseTag::from_tag("READY"), None);
        assert_eq!(ResponseTag::from_tag("fail"), None);
    }

    #[test]
    fn authorization_failures_have_distinct_messages() {
        let failures = [
            ResponseTag::FailNoAdmin,
            ResponseTag::FailBadToken,
            ResponseTag::FailNoOwner,
            ResponseTag::FailUserExist,
            ResponseTag::FailGroupExist,
            ResponseTag::FailUserNoExist,
            ResponseTag::FailGroupNoExist,
            ResponseTag::FailMember,
            ResponseTag::FailNoMember,
        ];
        let messages: HashSet<_> = failures.iter().map(|t| t.message()).collect();
        assert_eq!(messages.len(), failures.len());
    }
}
