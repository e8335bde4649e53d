//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `kpi` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain   | Description                                   |
//! |---------|----------|-----------------------------------------------|
//! | 0       | Universal| Success                                       |
//! | 1       | Universal| General error (unspecified)                   |
//! | 2       | Universal| Usage error (bad args, invalid submission)    |
//! | 3-9     | setup    | Config file, token, confirmation              |
//! | 10-19   | lookup   | Workbook / sheet / row resolution             |
//! | 20-29   | remote   | Spreadsheet service failures                  |
//! | 30-39   | access   | Password gate                                 |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant error conversion

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unparsable metric values, empty submission.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Setup (3-9)
// =============================================================================

/// Settings file missing, unreadable or invalid (including `[schema]`).
pub const EXIT_CONFIG: u8 = 3;

/// No Drive token in keychain or environment.
pub const EXIT_NO_TOKEN: u8 = 4;

/// Keychain error (cannot read/write the token).
pub const EXIT_KEYCHAIN: u8 = 5;

/// Submission not confirmed at the prompt. Nothing was written.
pub const EXIT_CANCELLED: u8 = 6;

// =============================================================================
// Lookup (10-19)
// =============================================================================

/// No workbook with the derived name in the month folder / root folder.
pub const EXIT_WORKBOOK_NOT_FOUND: u8 = 10;

/// A same-named file exists but is not a native spreadsheet.
pub const EXIT_FORMAT_MISMATCH: u8 = 11;

/// Staff member has no sheet in the workbook.
pub const EXIT_SHEET_NOT_FOUND: u8 = 12;

/// Report day lies outside the template's provisioned rows.
pub const EXIT_ROW_OUT_OF_RANGE: u8 = 13;

/// Day column of the target row holds a different day.
pub const EXIT_TEMPLATE_MISMATCH: u8 = 14;

// =============================================================================
// Remote (20-29)
// =============================================================================

/// Transient failure (network, timeout, quota, 5xx). Safe to retry.
pub const EXIT_REMOTE_RETRYABLE: u8 = 20;

/// Token rejected by the service.
pub const EXIT_REMOTE_AUTH: u8 = 21;

/// Any other service error (4xx, unexpected response).
pub const EXIT_REMOTE: u8 = 22;

// =============================================================================
// Access (30-39)
// =============================================================================

/// Password missing or rejected for the requested store / view.
pub const EXIT_ACCESS_DENIED: u8 = 30;
