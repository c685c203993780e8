mod javac;
