/// Turn a `-1` return value from a libc function into the current `errno`.
pub(crate) fn cerr<Int: Copy + TryInto<libc::c_long>>(res: Int) -> std::io::Result<Int> {
    match res.try_into() {
        Ok(-1) => Err(std::io::Error::last_os_error()),
        _ => Ok(res),
    }
}

#[cfg(test)]
mod test {
    use super::cerr;

    #[test]
    fn test_cerr() {
        assert_eq!(cerr(0).unwrap(), 0);
        assert_eq!(cerr(42).unwrap(), 42);

        let err = cerr(unsafe { libc::close(-1) }).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
