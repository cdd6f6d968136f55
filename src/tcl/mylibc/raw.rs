/* -------------------------------------------------------------------------- */
/*                                   Import                                   */
/* -------------------------------------------------------------------------- */

use super::Termios;

/* -------------------------------------------------------------------------- */
/*                        External Function Declaration                       */
/* -------------------------------------------------------------------------- */
// Declare the external C functions
extern "C" {
    pub(super) fn tcgetattr(fd: super::c_int, termios_p: *mut Termios) -> super::c_int;
    pub(super) fn tcsetattr(
        fd: super::c_int,
        optional_actions: super::c_int,
        termios_p: *const Termios,
    ) -> super::c_int;
}

